//! Keeps the active tab and the location in agreement.
//!
//! When the component is routable the location is the source of truth after
//! a navigation re-entry (reload, back/forward, deep link): the tab it names
//! becomes active if it passes the same checks as any other candidate. In the
//! other direction, a committed switch produces the URL the router should
//! move to.

use std::sync::Arc;

use serde::Serialize;
use tabs_security::Subject;

use crate::events::{ChangeSource, EventSink, TabEvent};
use crate::location::LocationSnapshot;
use crate::registry::TabCollection;
use crate::resolver::ActiveTabResolver;
use crate::state::ComponentState;

/// Result of reconciling state with the location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Unchanged,
    Changed { old: Option<String>, new: String },
}

/// Reconciles component state with the current location.
pub struct NavigationSynchronizer {
    resolver: Arc<ActiveTabResolver>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for NavigationSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationSynchronizer")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl NavigationSynchronizer {
    pub fn new(resolver: Arc<ActiveTabResolver>, sink: Arc<dyn EventSink>) -> Self {
        Self { resolver, sink }
    }

    /// Adopt the tab named by `location` if it differs from the active one.
    ///
    /// An invalid, unknown, or unauthorized tab in the URL leaves the state
    /// untouched; the previous active tab is kept.
    pub fn sync(
        &self,
        state: &mut ComponentState,
        collection: &TabCollection,
        location: &LocationSnapshot,
        instance_id: &str,
        subject: Option<&Subject>,
    ) -> SyncOutcome {
        let Some(raw) = self.resolver.url_candidate(location) else {
            return SyncOutcome::Unchanged;
        };
        if state.is_active(raw) {
            return SyncOutcome::Unchanged;
        }

        let new = match self.resolver.check(collection, raw, subject) {
            Ok(id) => id,
            Err(rejection) => {
                tracing::warn!(
                    instance_id,
                    tab_id = raw,
                    ?rejection,
                    kept = state.active(),
                    "ignoring tab from location"
                );
                return SyncOutcome::Unchanged;
            }
        };

        let old = state.set_active(new.as_str());
        state.mark_loaded(&new);
        self.resolver.remember(instance_id, &new);
        self.sink.emit(&TabEvent::Changed {
            old: old.clone(),
            new: new.clone(),
            source: ChangeSource::Navigation,
        });
        tracing::debug!(instance_id, tab_id = %new, "active tab synced from location");

        SyncOutcome::Changed { old, new }
    }

    /// URL the router should move to after `tab_id` became active.
    ///
    /// `None` when routing is off or the location already names the tab.
    #[must_use]
    pub fn url_update(&self, location: &LocationSnapshot, tab_id: &str) -> Option<String> {
        if !self.resolver.is_routable() {
            return None;
        }
        let urls = self.resolver.urls();
        if urls.tab_from(location) == Some(tab_id) {
            return None;
        }
        Some(urls.url_for(location, tab_id))
    }
}
