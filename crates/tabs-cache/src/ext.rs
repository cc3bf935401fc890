//! Extension trait for [`KeyValueStore`] with typed convenience methods.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::KeyValueStore;

/// Typed convenience methods for [`KeyValueStore`].
///
/// Provides `get_json`/`put_json` for serde-serializable types. These are
/// default methods on an extension trait so that [`KeyValueStore`] stays
/// object-safe and implementors only handle raw bytes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
/// use tabs_cache::{MemoryStore, StoreExt};
///
/// #[derive(Serialize, Deserialize)]
/// struct Snapshot { active: String }
///
/// let store = MemoryStore::new();
/// store.put_json("state", &Snapshot { active: "profile".into() }, Duration::from_secs(5));
/// let snapshot: Option<Snapshot> = store.get_json("state");
/// assert_eq!(snapshot.unwrap().active, "profile");
/// ```
pub trait StoreExt: KeyValueStore {
    /// Retrieve a JSON-deserialized value.
    ///
    /// Returns `None` on miss, expiry, or deserialization failure.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a value as JSON.
    ///
    /// Silently does nothing if serialization fails.
    fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.put(key, &bytes, ttl);
        }
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}
