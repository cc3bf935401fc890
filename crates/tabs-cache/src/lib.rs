//! Content cache for rendered tab content.
//!
//! This crate decouples the content cache from the storage mechanism behind
//! it. Two traits describe what a backing store can do:
//!
//! - [`KeyValueStore`]: Plain key-value store with TTL expiry
//! - [`TaggedStore`]: Store that can additionally attach tags to entries and
//!   remove every entry carrying a tag set
//!
//! Capability is checked at runtime through [`KeyValueStore::as_tagged`], so
//! [`ContentCache`] can degrade to single-key removal on plain stores.
//!
//! # Implementations
//!
//! - [`NullStore`]: No-op store (always misses)
//! - [`MemoryStore`]: Sharded in-process store with tag support
//! - [`FileStore`]: File-based store with version validation, no tags
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tabs_cache::{CacheSettings, ContentCache, MemoryStore};
//!
//! let settings = CacheSettings {
//!     enabled: true,
//!     ttl: Duration::from_secs(60),
//!     ..CacheSettings::default()
//! };
//! let cache = ContentCache::new(Arc::new(MemoryStore::new()), settings);
//! cache.put("profile", Some("42"), "<p>profile</p>");
//! assert_eq!(cache.get("profile", Some("42")).as_deref(), Some("<p>profile</p>"));
//! ```

mod content;
mod ext;
mod file;
mod memory;
mod preload;

use std::time::Duration;

pub use content::{CacheEntry, CacheSettings, CacheStats, ContentCache};
pub use ext::StoreExt;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use preload::{BoxError, PreloadExecutor, PreloadJob, PreloadSource, ThreadExecutor};

/// Longest lifetime a store grants an entry.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Key-value store with per-entry TTL.
///
/// Stores never report failures to the caller: the cache is an accelerator,
/// so write errors are logged and dropped and read errors read as misses.
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for diagnostics (e.g., "memory", "file").
    fn name(&self) -> &'static str;

    /// Retrieve a value.
    ///
    /// Returns `None` on miss or when the entry has expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value that expires after `ttl`.
    ///
    /// Overwrites any existing entry for the same key.
    fn put(&self, key: &str, value: &[u8], ttl: Duration);

    /// Remove a single entry. Returns `true` if an entry was removed.
    fn forget(&self, key: &str) -> bool;

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Returns the number of removed entries.
    fn clear_prefix(&self, prefix: &str) -> usize;

    /// Tag capability of this store, if any.
    fn as_tagged(&self) -> Option<&dyn TaggedStore> {
        None
    }
}

/// A [`KeyValueStore`] that supports tag-based group removal.
pub trait TaggedStore: KeyValueStore {
    /// Store a value with a set of tags.
    fn put_tagged(&self, key: &str, value: &[u8], ttl: Duration, tags: &[String]);

    /// Remove every entry whose tags include **all** of `tags`.
    ///
    /// An empty tag list removes nothing. Returns the number of removed entries.
    fn flush_tagged(&self, tags: &[String]) -> usize;
}

/// No-op [`KeyValueStore`] that never stores or retrieves data.
///
/// Use when caching is disabled. All operations are no-ops and all lookups
/// return `None`.
#[derive(Debug, Default)]
pub struct NullStore;

impl KeyValueStore for NullStore {
    fn name(&self) -> &'static str {
        "none"
    }

    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _value: &[u8], _ttl: Duration) {}

    fn forget(&self, _key: &str) -> bool {
        false
    }

    fn clear_prefix(&self, _prefix: &str) -> usize {
        0
    }
}
