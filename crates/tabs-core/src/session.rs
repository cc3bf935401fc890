//! Pluggable storage for the remembered tab.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Session-scoped string store.
///
/// Entries live as long as the host's session does; the store never expires
/// them on its own.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str);
    fn forget(&self, key: &str);
}

/// Session key under which an instance's active tab is remembered.
#[must_use]
pub fn remembered_tab_key(instance_id: &str) -> String {
    format!("tabs_active_{instance_id}")
}

/// In-process [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }

    fn forget(&self, key: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
