//! In-process tagged store.
//!
//! [`MemoryStore`] splits its entries across a fixed number of shards, each
//! behind its own `RwLock`. A key always maps to the same shard, so readers
//! and writers of unrelated keys rarely contend. Group operations
//! (`clear_prefix`, `flush_tagged`, `purge_expired`) visit every shard in turn
//! and never hold more than one shard lock at a time.
//!
//! Every `SWEEP_EVERY` writes the store sweeps expired entries, so keys
//! that are never read again do not pile up.

use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::{KeyValueStore, MAX_TTL, TaggedStore};

/// Number of shards.
const SHARDS: usize = 16;

/// Writes between sweeps of expired entries.
const SWEEP_EVERY: usize = 1024;

struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
    tags: BTreeSet<String>,
}

impl StoredEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

type Shard = RwLock<HashMap<String, StoredEntry>>;

/// Sharded in-memory [`TaggedStore`].
///
/// Expired entries read as absent. They stay in memory until overwritten,
/// removed, or swept by [`MemoryStore::purge_expired`], which also runs
/// periodically on write. Lifetimes are capped at [`MAX_TTL`].
pub struct MemoryStore {
    shards: Vec<Shard>,
    hasher: RandomState,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            writes: AtomicUsize::new(0),
        }
    }

    fn shard(&self, key: &str) -> &Shard {
        let hash = self.hasher.hash_one(key);
        // Truncation is fine: only the low bits select the shard.
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hash as usize) % SHARDS;
        &self.shards[idx]
    }

    fn insert(&self, key: &str, value: &[u8], ttl: Duration, tags: BTreeSet<String>) {
        let now = Instant::now();
        let entry = StoredEntry {
            value: value.to_vec(),
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
            tags,
        };
        self.shard(key)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), entry);

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1).is_multiple_of(SWEEP_EVERY) {
            let purged = self.purge_expired();
            tracing::trace!(purged, "swept expired entries");
        }
    }

    /// Remove entries matching `predicate` from every shard.
    fn remove_where(&self, predicate: impl Fn(&str, &StoredEntry) -> bool) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut map = shard.write().unwrap_or_else(PoisonError::into_inner);
            let before = map.len();
            map.retain(|k, e| !predicate(k, e));
            removed += before - map.len();
        }
        removed
    }

    /// Drop every expired entry. Returns the number of dropped entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.remove_where(|_, e| !e.is_fresh(now))
    }

    /// Number of fresh entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .filter(|e| e.is_fresh(now))
                    .count()
            })
            .sum()
    }

    /// Whether the store holds no fresh entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.shard(key).read().unwrap_or_else(PoisonError::into_inner);
        map.get(key)
            .filter(|e| e.is_fresh(Instant::now()))
            .map(|e| e.value.clone())
    }

    fn put(&self, key: &str, value: &[u8], ttl: Duration) {
        self.insert(key, value, ttl, BTreeSet::new());
    }

    fn forget(&self, key: &str) -> bool {
        self.shard(key)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn clear_prefix(&self, prefix: &str) -> usize {
        self.remove_where(|k, _| k.starts_with(prefix))
    }

    fn as_tagged(&self) -> Option<&dyn TaggedStore> {
        Some(self)
    }
}

impl TaggedStore for MemoryStore {
    fn put_tagged(&self, key: &str, value: &[u8], ttl: Duration, tags: &[String]) {
        self.insert(key, value, ttl, tags.iter().cloned().collect());
    }

    fn flush_tagged(&self, tags: &[String]) -> usize {
        if tags.is_empty() {
            return 0;
        }
        self.remove_where(|_, e| e.has_all_tags(tags))
    }
}
