//! Per-instance component state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// State owned by one UI instance: the active tab, which tabs have been
/// loaded, and the last error message per tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentState {
    active: Option<String>,
    loaded: BTreeSet<String>,
    errors: BTreeMap<String, String>,
}

impl ComponentState {
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Replace the active tab. Returns the previous one.
    pub fn set_active(&mut self, tab_id: impl Into<String>) -> Option<String> {
        self.active.replace(tab_id.into())
    }

    #[must_use]
    pub fn is_active(&self, tab_id: &str) -> bool {
        self.active.as_deref() == Some(tab_id)
    }

    pub fn mark_loaded(&mut self, tab_id: &str) {
        self.loaded.insert(tab_id.to_owned());
    }

    #[must_use]
    pub fn is_loaded(&self, tab_id: &str) -> bool {
        self.loaded.contains(tab_id)
    }

    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(String::as_str)
    }

    pub fn set_error(&mut self, tab_id: &str, message: impl Into<String>) {
        self.errors.insert(tab_id.to_owned(), message.into());
    }

    pub fn clear_error(&mut self, tab_id: &str) {
        self.errors.remove(tab_id);
    }

    #[must_use]
    pub fn error(&self, tab_id: &str) -> Option<&str> {
        self.errors.get(tab_id).map(String::as_str)
    }

    #[must_use]
    pub fn has_error(&self, tab_id: &str) -> bool {
        self.errors.contains_key(tab_id)
    }

    /// Forget that `tab_id` was loaded or failed.
    pub fn reset(&mut self, tab_id: &str) {
        self.loaded.remove(tab_id);
        self.errors.remove(tab_id);
    }
}
