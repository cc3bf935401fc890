//! Keyed, tagged cache of rendered tab content.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{KeyValueStore, PreloadExecutor, PreloadSource, StoreExt, ThreadExecutor};

/// Runtime settings for [`ContentCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Master switch. When off every operation is a miss or a no-op.
    pub enabled: bool,
    /// Lifetime of a stored entry.
    pub ttl: Duration,
    /// Key prefix and global tag.
    pub namespace: String,
    /// Use tag-based storage and invalidation when the store supports it.
    pub tags: bool,
    /// Partition entries by subject id.
    pub per_subject: bool,
    /// Allow [`ContentCache::preload_adjacent`] to schedule work.
    pub preload_adjacent: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(3600),
            namespace: "naptab".to_owned(),
            tags: true,
            per_subject: true,
            preload_adjacent: true,
        }
    }
}

/// Stored representation of one piece of rendered content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: String,
    /// Insertion time in milliseconds since the Unix epoch.
    pub cached_at: u64,
    pub tab_id: String,
    pub subject_id: Option<String>,
    /// SHA-256 hex digest of `content`.
    pub hash: String,
}

impl CacheEntry {
    fn new(tab_id: &str, subject_id: Option<&str>, content: &str) -> Self {
        Self {
            content: content.to_owned(),
            cached_at: now_millis(),
            tab_id: tab_id.to_owned(),
            subject_id: subject_id.map(str::to_owned),
            hash: content_hash(content),
        }
    }

    /// Whether the entry is still within `ttl` of its insertion.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        now_millis() < self.cached_at.saturating_add(ttl_ms)
    }
}

/// Diagnostic snapshot of a [`ContentCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub backend: &'static str,
    pub namespace: String,
    pub supports_tags: bool,
    pub ttl_secs: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Rendered-content cache over a [`KeyValueStore`].
///
/// Entries are keyed by `(tab id, subject id)` and tagged with the namespace,
/// `tab:<id>` and, when partitioned, `subject:<id>`. On stores without tag
/// support, invalidation falls back to removing the exact key.
///
/// Failures are never returned: a broken store behaves like an empty one.
/// Cloning is cheap and clones share the same store.
///
/// Every invalidation bumps a generation counter. A preload scheduled before
/// an invalidation discards its result instead of storing stale content.
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn KeyValueStore>,
    settings: Arc<CacheSettings>,
    executor: Arc<dyn PreloadExecutor>,
    generation: Arc<AtomicU64>,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ContentCache {
    /// Create a cache that preloads on background threads.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, settings: CacheSettings) -> Self {
        Self::with_executor(store, settings, Arc::new(ThreadExecutor))
    }

    /// Create a cache with a custom preload executor.
    #[must_use]
    pub fn with_executor(
        store: Arc<dyn KeyValueStore>,
        settings: CacheSettings,
        executor: Arc<dyn PreloadExecutor>,
    ) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            executor,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn subject<'a>(&self, subject_id: Option<&'a str>) -> Option<&'a str> {
        subject_id.filter(|_| self.settings.per_subject)
    }

    /// Store key for a tab and optional subject.
    ///
    /// `{namespace}:content:{tab}` or `{namespace}:content:{tab}:subject:{id}`.
    #[must_use]
    pub fn content_key(&self, tab_id: &str, subject_id: Option<&str>) -> String {
        let ns = &self.settings.namespace;
        match self.subject(subject_id) {
            Some(subject) => format!("{ns}:content:{tab_id}:subject:{subject}"),
            None => format!("{ns}:content:{tab_id}"),
        }
    }

    /// Tag set attached to an entry.
    #[must_use]
    pub fn tags(&self, tab_id: &str, subject_id: Option<&str>) -> Vec<String> {
        let mut tags = vec![self.settings.namespace.clone(), format!("tab:{tab_id}")];
        if let Some(subject) = self.subject(subject_id) {
            tags.push(format!("subject:{subject}"));
        }
        tags
    }

    /// Whether tag-based storage is in effect.
    #[must_use]
    pub fn supports_tags(&self) -> bool {
        self.settings.tags && self.store.as_tagged().is_some()
    }

    /// Store rendered content for a tab.
    pub fn put(&self, tab_id: &str, subject_id: Option<&str>, content: &str) {
        if !self.is_enabled() {
            return;
        }

        let subject = self.subject(subject_id);
        let key = self.content_key(tab_id, subject);
        let entry = CacheEntry::new(tab_id, subject, content);
        let ttl = self.settings.ttl;

        match self.store.as_tagged().filter(|_| self.settings.tags) {
            Some(tagged) => match serde_json::to_vec(&entry) {
                Ok(bytes) => tagged.put_tagged(&key, &bytes, ttl, &self.tags(tab_id, subject)),
                Err(e) => {
                    tracing::warn!(tab_id, error = %e, "failed to encode cache entry");
                    return;
                }
            },
            None => self.store.put_json(&key, &entry, ttl),
        }

        tracing::debug!(tab_id, key, hash = %entry.hash, "content_cached");
    }

    /// Fresh entry for a tab, if any.
    #[must_use]
    pub fn get_entry(&self, tab_id: &str, subject_id: Option<&str>) -> Option<CacheEntry> {
        if !self.is_enabled() {
            return None;
        }

        let key = self.content_key(tab_id, subject_id);
        let entry: CacheEntry = self.store.get_json(&key)?;
        if !entry.is_fresh(self.settings.ttl) {
            return None;
        }

        tracing::debug!(tab_id, key, "content_hit");
        Some(entry)
    }

    /// Fresh content for a tab, if any.
    #[must_use]
    pub fn get(&self, tab_id: &str, subject_id: Option<&str>) -> Option<String> {
        self.get_entry(tab_id, subject_id)
            .map(|entry| entry.content)
    }

    /// Remove cached content for a tab.
    ///
    /// With tags, `subject_id = None` removes the tab's entries for every
    /// subject. Without tags only the exact key is removed. Returns the number
    /// of removed entries.
    pub fn invalidate(&self, tab_id: &str, subject_id: Option<&str>) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        let removed = match self.store.as_tagged().filter(|_| self.settings.tags) {
            Some(tagged) => tagged.flush_tagged(&self.tags(tab_id, subject_id)),
            None => usize::from(self.store.forget(&self.content_key(tab_id, subject_id))),
        };

        tracing::debug!(tab_id, subject = ?subject_id, removed, "content_invalidated");
        removed
    }

    /// Remove every entry under the namespace.
    pub fn invalidate_all(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        let ns = &self.settings.namespace;
        let removed = match self.store.as_tagged().filter(|_| self.settings.tags) {
            Some(tagged) => tagged.flush_tagged(std::slice::from_ref(ns)),
            None => self.store.clear_prefix(&format!("{ns}:")),
        };

        tracing::debug!(namespace = %ns, removed, "cache_cleared");
        removed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            backend: self.store.name(),
            namespace: self.settings.namespace.clone(),
            supports_tags: self.supports_tags(),
            ttl_secs: self.settings.ttl.as_secs(),
        }
    }

    /// Schedule production of the tabs immediately before and after `current_id`.
    ///
    /// Disabled tabs and tabs with a fresh entry are skipped. Production runs
    /// on the executor and never blocks or fails the caller. Returns the ids
    /// that were scheduled.
    pub fn preload_adjacent(
        &self,
        ordered: &[Arc<dyn PreloadSource>],
        current_id: &str,
        subject_id: Option<&str>,
    ) -> Vec<String> {
        if !self.is_enabled() || !self.settings.preload_adjacent {
            return Vec::new();
        }
        let Some(pos) = ordered.iter().position(|s| s.id() == current_id) else {
            return Vec::new();
        };

        let neighbors = [
            pos.checked_sub(1).and_then(|i| ordered.get(i)),
            ordered.get(pos + 1),
        ];

        let mut scheduled = Vec::new();
        for source in neighbors.into_iter().flatten() {
            if source.is_disabled() || self.get_entry(source.id(), subject_id).is_some() {
                continue;
            }

            let id = source.id().to_owned();
            let cache = self.clone();
            let source = Arc::clone(source);
            let subject = subject_id.map(str::to_owned);
            let generation = self.generation.load(Ordering::SeqCst);
            self.executor.execute(Box::new(move || {
                cache.preload_one(source.as_ref(), subject.as_deref(), generation);
            }));

            tracing::debug!(tab_id = %id, "preload_scheduled");
            scheduled.push(id);
        }
        scheduled
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn preload_one(&self, source: &dyn PreloadSource, subject_id: Option<&str>, generation: u64) {
        let id = source.id();
        let content = match panic::catch_unwind(AssertUnwindSafe(|| source.produce())) {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                tracing::warn!(tab_id = id, error = %e, "preload failed");
                return;
            }
            Err(_) => {
                tracing::warn!(tab_id = id, "preload producer panicked");
                return;
            }
        };

        if !self.is_current(generation) {
            tracing::debug!(tab_id = id, "preload discarded after invalidation");
            return;
        }
        self.put(id, subject_id, &content);
        // An invalidation that raced the put must still win
        if !self.is_current(generation) {
            self.store.forget(&self.content_key(id, subject_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, FileStore, MemoryStore, NullStore, PreloadJob};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn settings() -> CacheSettings {
        CacheSettings {
            enabled: true,
            ttl: Duration::from_secs(60),
            ..CacheSettings::default()
        }
    }

    fn memory_cache() -> ContentCache {
        ContentCache::new(Arc::new(MemoryStore::new()), settings())
    }

    /// Runs jobs on the calling thread and records how many ran.
    #[derive(Default)]
    struct InlineExecutor {
        runs: AtomicUsize,
    }

    impl PreloadExecutor for InlineExecutor {
        fn execute(&self, job: PreloadJob) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            job();
        }
    }

    /// Holds jobs until `run_all` is called.
    #[derive(Default)]
    struct DeferredExecutor {
        jobs: Mutex<Vec<PreloadJob>>,
    }

    impl DeferredExecutor {
        fn run_all(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
            for job in jobs {
                job();
            }
        }
    }

    impl PreloadExecutor for DeferredExecutor {
        fn execute(&self, job: PreloadJob) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    struct Source {
        id: &'static str,
        disabled: bool,
        fail: bool,
        calls: Mutex<usize>,
    }

    impl Source {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                disabled: false,
                fail: false,
                calls: Mutex::new(0),
            })
        }
    }

    impl PreloadSource for Source {
        fn id(&self) -> &str {
            self.id
        }

        fn is_disabled(&self) -> bool {
            self.disabled
        }

        fn produce(&self) -> Result<String, BoxError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err("backend down".into());
            }
            Ok(format!("<p>{}</p>", self.id))
        }
    }

    fn as_sources(items: &[Arc<Source>]) -> Vec<Arc<dyn PreloadSource>> {
        items
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn PreloadSource>)
            .collect()
    }

    #[test]
    fn test_content_key_format() {
        let cache = memory_cache();
        assert_eq!(cache.content_key("profile", None), "naptab:content:profile");
        assert_eq!(
            cache.content_key("profile", Some("42")),
            "naptab:content:profile:subject:42"
        );
    }

    #[test]
    fn test_subject_ignored_when_not_partitioned() {
        let cache = ContentCache::new(
            Arc::new(MemoryStore::new()),
            CacheSettings {
                per_subject: false,
                ..settings()
            },
        );
        assert_eq!(cache.content_key("a", Some("42")), "naptab:content:a");
        assert_eq!(cache.tags("a", Some("42")), vec!["naptab", "tab:a"]);
    }

    #[test]
    fn test_tags() {
        let cache = memory_cache();
        assert_eq!(cache.tags("a", None), vec!["naptab", "tab:a"]);
        assert_eq!(
            cache.tags("a", Some("7")),
            vec!["naptab", "tab:a", "subject:7"]
        );
    }

    #[test]
    fn test_put_and_get() {
        let cache = memory_cache();
        cache.put("a", Some("1"), "<p>a</p>");

        assert_eq!(cache.get("a", Some("1")).as_deref(), Some("<p>a</p>"));
        assert_eq!(cache.get("a", Some("2")), None);
        assert_eq!(cache.get("a", None), None);
    }

    #[test]
    fn test_entry_records_metadata() {
        let cache = memory_cache();
        cache.put("a", Some("1"), "hello");

        let entry = cache.get_entry("a", Some("1")).unwrap();
        assert_eq!(entry.tab_id, "a");
        assert_eq!(entry.subject_id.as_deref(), Some("1"));
        assert_eq!(
            entry.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_disabled_cache_is_noop() {
        let cache = ContentCache::new(Arc::new(MemoryStore::new()), CacheSettings::default());
        cache.put("a", None, "x");
        assert_eq!(cache.get("a", None), None);
        assert_eq!(cache.invalidate("a", None), 0);
        assert_eq!(cache.invalidate_all(), 0);
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let cache = ContentCache::new(
            Arc::new(MemoryStore::new()),
            CacheSettings {
                ttl: Duration::from_millis(20),
                ..settings()
            },
        );
        cache.put("a", None, "x");
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("a", None), None);
    }

    #[test]
    fn test_invalidate_with_tags_is_selective() {
        let cache = memory_cache();
        cache.put("a", Some("1"), "a1");
        cache.put("a", Some("2"), "a2");
        cache.put("b", Some("1"), "b1");

        assert_eq!(cache.invalidate("a", Some("1")), 1);
        assert_eq!(cache.get("a", Some("1")), None);
        assert_eq!(cache.get("a", Some("2")).as_deref(), Some("a2"));

        assert_eq!(cache.invalidate("a", None), 1);
        assert_eq!(cache.get("a", Some("2")), None);
        assert_eq!(cache.get("b", Some("1")).as_deref(), Some("b1"));
    }

    #[test]
    fn test_invalidate_without_tags_removes_exact_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = ContentCache::new(
            Arc::new(FileStore::new(tmp.path().to_path_buf(), "1")),
            settings(),
        );
        assert!(!cache.supports_tags());

        cache.put("a", Some("1"), "a1");
        cache.put("a", Some("2"), "a2");

        assert_eq!(cache.invalidate("a", Some("1")), 1);
        assert_eq!(cache.get("a", Some("1")), None);
        assert_eq!(cache.get("a", Some("2")).as_deref(), Some("a2"));
        // Only the bare key is targeted without a subject
        assert_eq!(cache.invalidate("a", None), 0);
    }

    #[test]
    fn test_tags_setting_off_uses_plain_keys() {
        let cache = ContentCache::new(
            Arc::new(MemoryStore::new()),
            CacheSettings {
                tags: false,
                ..settings()
            },
        );
        assert!(!cache.supports_tags());
        cache.put("a", Some("1"), "a1");
        cache.put("a", Some("2"), "a2");
        assert_eq!(cache.invalidate("a", None), 0);
        assert_eq!(cache.invalidate("a", Some("2")), 1);
        assert_eq!(cache.get("a", Some("1")).as_deref(), Some("a1"));
    }

    #[test]
    fn test_invalidate_all_tagged() {
        let cache = memory_cache();
        cache.put("a", None, "a");
        cache.put("b", Some("1"), "b");
        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.get("a", None), None);
    }

    #[test]
    fn test_invalidate_all_plain_clears_namespace_prefix() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(tmp.path().to_path_buf(), "1"));
        store.put("foreign:key", b"keep", Duration::from_secs(60));
        let cache = ContentCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, settings());

        cache.put("a", None, "a");
        cache.put("b", Some("1"), "b");

        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(store.get("foreign:key"), Some(b"keep".to_vec()));
    }

    #[test]
    fn test_null_store_always_misses() {
        let cache = ContentCache::new(Arc::new(NullStore), settings());
        cache.put("a", None, "x");
        assert_eq!(cache.get("a", None), None);
    }

    #[test]
    fn test_stats() {
        let cache = memory_cache();
        assert_eq!(
            cache.stats(),
            CacheStats {
                enabled: true,
                backend: "memory",
                namespace: "naptab".to_owned(),
                supports_tags: true,
                ttl_secs: 60,
            }
        );
    }

    #[test]
    fn test_preload_adjacent_schedules_neighbors() {
        let executor = Arc::new(InlineExecutor::default());
        let cache = ContentCache::with_executor(
            Arc::new(MemoryStore::new()),
            settings(),
            Arc::clone(&executor) as Arc<dyn PreloadExecutor>,
        );
        let tabs = [
            Source::new("a"),
            Source::new("b"),
            Source::new("c"),
            Source::new("d"),
        ];

        let scheduled = cache.preload_adjacent(&as_sources(&tabs), "b", Some("1"));

        assert_eq!(scheduled, vec!["a", "c"]);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("a", Some("1")).as_deref(), Some("<p>a</p>"));
        assert_eq!(cache.get("c", Some("1")).as_deref(), Some("<p>c</p>"));
        assert_eq!(cache.get("d", Some("1")), None);
        assert_eq!(*tabs[1].calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_preload_skips_disabled_and_cached() {
        let executor = Arc::new(InlineExecutor::default());
        let cache = ContentCache::with_executor(
            Arc::new(MemoryStore::new()),
            settings(),
            Arc::clone(&executor) as Arc<dyn PreloadExecutor>,
        );
        let disabled = Arc::new(Source {
            id: "a",
            disabled: true,
            fail: false,
            calls: Mutex::new(0),
        });
        let tabs = [disabled, Source::new("b"), Source::new("c")];
        cache.put("c", None, "already");

        let scheduled = cache.preload_adjacent(&as_sources(&tabs), "b", None);

        assert!(scheduled.is_empty());
        assert_eq!(*tabs[0].calls.lock().unwrap(), 0);
        assert_eq!(cache.get("c", None).as_deref(), Some("already"));
    }

    #[test]
    fn test_preload_at_edges_and_unknown_current() {
        let executor = Arc::new(InlineExecutor::default());
        let cache = ContentCache::with_executor(Arc::new(MemoryStore::new()), settings(), executor);
        let tabs = as_sources(&[Source::new("a"), Source::new("b")]);

        assert_eq!(cache.preload_adjacent(&tabs, "a", None), vec!["b"]);
        cache.invalidate_all();
        assert_eq!(cache.preload_adjacent(&tabs, "b", None), vec!["a"]);
        assert!(cache.preload_adjacent(&tabs, "zzz", None).is_empty());
    }

    #[test]
    fn test_preload_failure_is_swallowed() {
        let executor = Arc::new(InlineExecutor::default());
        let cache = ContentCache::with_executor(Arc::new(MemoryStore::new()), settings(), executor);
        let failing = Arc::new(Source {
            id: "b",
            disabled: false,
            fail: true,
            calls: Mutex::new(0),
        });
        let tabs = [Source::new("a"), failing];

        let scheduled = cache.preload_adjacent(&as_sources(&tabs), "a", None);

        assert_eq!(scheduled, vec!["b"]);
        assert_eq!(cache.get("b", None), None);
    }

    #[test]
    fn test_preload_finishing_after_invalidation_is_discarded() {
        let executor = Arc::new(DeferredExecutor::default());
        let cache = ContentCache::with_executor(
            Arc::new(MemoryStore::new()),
            settings(),
            Arc::clone(&executor) as Arc<dyn PreloadExecutor>,
        );
        let tabs = as_sources(&[Source::new("a"), Source::new("b")]);

        assert_eq!(cache.preload_adjacent(&tabs, "a", None), vec!["b"]);
        cache.invalidate("b", None);
        executor.run_all();

        assert_eq!(cache.get("b", None), None);
    }

    #[test]
    fn test_deferred_preload_without_invalidation_is_stored() {
        let executor = Arc::new(DeferredExecutor::default());
        let cache = ContentCache::with_executor(
            Arc::new(MemoryStore::new()),
            settings(),
            Arc::clone(&executor) as Arc<dyn PreloadExecutor>,
        );
        let tabs = as_sources(&[Source::new("a"), Source::new("b")]);

        cache.preload_adjacent(&tabs, "a", None);
        assert_eq!(cache.get("b", None), None);
        executor.run_all();

        assert_eq!(cache.get("b", None).as_deref(), Some("<p>b</p>"));
    }

    #[test]
    fn test_preload_respects_setting() {
        let cache = ContentCache::new(
            Arc::new(MemoryStore::new()),
            CacheSettings {
                preload_adjacent: false,
                ..settings()
            },
        );
        let tabs = as_sources(&[Source::new("a"), Source::new("b")]);
        assert!(cache.preload_adjacent(&tabs, "a", None).is_empty());
    }
}
