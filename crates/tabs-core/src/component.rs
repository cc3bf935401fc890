//! Per-instance facade exposing the UI operations.
//!
//! A [`TabsComponent`] owns the state of one tab set on one page. Every
//! operation rebuilds the visible collection for the current subject, runs
//! the security checks, and only then touches state: a failed operation
//! leaves the state exactly as it was (apart from the recorded error
//! message for a failed load).

use serde::Serialize;
use tabs_security::{CallerIdentity, DenialReason, RateLimit, Subject};

use crate::definition::SwitchContext;
use crate::error::TabError;
use crate::events::{ChangeSource, TabEvent};
use crate::hooks::LoadedContent;
use crate::location::LocationSnapshot;
use crate::navigation::SyncOutcome;
use crate::registry::{TabCollection, TabRegistry};
use crate::resolver::{Resolution, ResolveRequest};
use crate::runtime::TabsRuntime;
use crate::state::ComponentState;

/// Result of a switch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    /// The requested tab.
    pub tab_id: String,
    /// Active tab before the request.
    pub previous: Option<String>,
    /// The request repeated a recent switch and was ignored.
    pub debounced: bool,
    /// URL the router was asked to move to.
    pub redirect: Option<String>,
    /// Neighbours scheduled for preloading.
    pub preloaded: Vec<String>,
}

/// State and operations of one tabs UI instance.
#[derive(Debug)]
pub struct TabsComponent {
    runtime: TabsRuntime,
    instance_id: String,
    registry: TabRegistry,
    state: ComponentState,
    subject: Option<Subject>,
    caller: CallerIdentity,
    location: LocationSnapshot,
}

impl TabsComponent {
    pub(crate) fn new(runtime: TabsRuntime, instance_id: String, registry: TabRegistry) -> Self {
        Self {
            runtime,
            instance_id,
            registry,
            state: ComponentState::default(),
            subject: None,
            caller: CallerIdentity::default(),
            location: LocationSnapshot::default(),
        }
    }

    /// Act on behalf of `subject`.
    #[must_use]
    pub fn with_subject(mut self, subject: Option<Subject>) -> Self {
        if self.caller.subject_id.is_none() {
            self.caller.subject_id = subject.as_ref().map(|s| s.id.clone());
        }
        self.subject = subject;
        self
    }

    /// Caller facts used for rate limiting, debouncing and CSRF binding.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Location the component is rendered at.
    #[must_use]
    pub fn with_location(mut self, location: LocationSnapshot) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    #[must_use]
    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    #[must_use]
    pub fn active_tab(&self) -> Option<&str> {
        self.state.active()
    }

    #[must_use]
    pub fn location(&self) -> &LocationSnapshot {
        &self.location
    }

    /// Visible tabs for the current subject.
    #[must_use]
    pub fn tabs(&self) -> TabCollection {
        self.registry.collection(self.subject.as_ref())
    }

    fn subject_id(&self) -> Option<&str> {
        self.subject.as_ref().map(|s| s.id.as_str())
    }

    /// Session the component is bound to. Falls back to the instance id.
    fn session_id(&self) -> &str {
        self.caller.session_id.as_deref().unwrap_or(&self.instance_id)
    }

    /// Resolve and activate the initial tab.
    ///
    /// Returns the active tab, or `None` when no visible tab is accessible.
    pub fn mount(&mut self, candidate: Option<&str>) -> Option<String> {
        let collection = self.tabs();
        let resolution = self.resolve_in(&collection, candidate);
        if let Some(id) = &resolution.active {
            self.state.set_active(id.as_str());
            self.state.mark_loaded(id);
        }
        self.runtime.events().emit(&TabEvent::Init {
            instance_id: self.instance_id.clone(),
            tabs_count: collection.len(),
            active: resolution.active.clone(),
        });
        resolution.active
    }

    /// Active tab that the current sources resolve to. Does not mutate state.
    #[must_use]
    pub fn resolve_active_tab(&self, candidate: Option<&str>) -> Option<String> {
        self.resolve_with_trail(candidate).active
    }

    /// Like [`resolve_active_tab`](Self::resolve_active_tab), with every
    /// rejected candidate.
    #[must_use]
    pub fn resolve_with_trail(&self, candidate: Option<&str>) -> Resolution {
        self.resolve_in(&self.tabs(), candidate)
    }

    fn resolve_in(&self, collection: &TabCollection, candidate: Option<&str>) -> Resolution {
        self.runtime.resolver().resolve(&ResolveRequest {
            collection,
            explicit: candidate,
            location: Some(&self.location),
            instance_id: &self.instance_id,
            subject: self.subject.as_ref(),
        })
    }

    /// Make `raw` the active tab.
    pub fn switch_to(&mut self, raw: &str) -> Result<SwitchOutcome, TabError> {
        let result = self.try_switch(raw);
        if let Err(e) = &result {
            tracing::debug!(instance_id = %self.instance_id, tab_id = raw, error = %e, "switch rejected");
        }
        result
    }

    /// [`switch_to`](Self::switch_to) for requests that carry a CSRF token.
    pub fn switch_to_verified(&mut self, raw: &str, token: &str) -> Result<SwitchOutcome, TabError> {
        let id = self.runtime.gate().validate_identifier(raw)?;
        if !self
            .runtime
            .gate()
            .verify_csrf(token, id.as_str(), self.session_id())
        {
            return Err(TabError::AccessDenied {
                tab_id: id.into_string(),
                reason: DenialReason::CsrfRejected,
            });
        }
        self.switch_to(id.as_str())
    }

    fn try_switch(&mut self, raw: &str) -> Result<SwitchOutcome, TabError> {
        let runtime = self.runtime.clone();
        let gate = runtime.gate();

        let id = gate.validate_identifier(raw)?.into_string();

        let caller_key = gate.caller_key(&self.caller);
        if let RateLimit::Limited { reset_at } = gate.check_rate_limit(&id, &caller_key) {
            return Err(TabError::RateLimited {
                tab_id: id,
                reset_at,
            });
        }

        let collection = self.tabs();
        let tab = collection
            .get(&id)
            .ok_or_else(|| TabError::NotFound(id.clone()))?;
        runtime.pipeline().authorize(tab, self.subject.as_ref())?;

        if gate.is_debounced(self.session_id(), &id) {
            tracing::debug!(instance_id = %self.instance_id, tab_id = %id, "switch debounced");
            return Ok(SwitchOutcome {
                tab_id: id,
                previous: self.state.active().map(str::to_owned),
                debounced: true,
                redirect: None,
                preloaded: Vec::new(),
            });
        }

        runtime.pipeline().before_switch(
            tab,
            &SwitchContext {
                from: self.state.active(),
                to: &id,
                instance_id: &self.instance_id,
                subject: self.subject.as_ref(),
            },
        )?;

        let previous = self.state.set_active(id.as_str());
        self.state.mark_loaded(&id);
        gate.record_switch(self.session_id(), &id);
        runtime.resolver().remember(&self.instance_id, &id);

        if previous.as_deref() != Some(id.as_str()) {
            runtime.events().emit(&TabEvent::Changed {
                old: previous.clone(),
                new: id.clone(),
                source: ChangeSource::Switch,
            });
        }

        let redirect = runtime.synchronizer().url_update(&self.location, &id);
        if let Some(url) = &redirect {
            runtime.navigate(url);
            self.location = LocationSnapshot::parse(url);
        }

        let preloaded = self.preload_in(&collection);

        tracing::debug!(
            instance_id = %self.instance_id,
            from = previous.as_deref(),
            to = %id,
            "switched tab"
        );

        Ok(SwitchOutcome {
            tab_id: id,
            previous,
            debounced: false,
            redirect,
            preloaded,
        })
    }

    /// Produce the content of `raw` through the hook pipeline.
    ///
    /// A failure is recorded as the tab's error message. Fallback content from
    /// `on_error` is returned but does not mark the tab loaded.
    pub fn load_content(&mut self, raw: &str) -> Result<LoadedContent, TabError> {
        let id = self.runtime.gate().validate_identifier(raw)?.into_string();
        let collection = self.tabs();
        let tab = collection
            .get(&id)
            .ok_or_else(|| TabError::NotFound(id.clone()))?;

        match self.runtime.pipeline().load(tab, self.subject.as_ref()) {
            Ok(loaded) => {
                if !loaded.fallback {
                    self.state.mark_loaded(&id);
                    self.state.clear_error(&id);
                }
                Ok(loaded)
            }
            Err(e) => {
                self.state.set_error(&id, e.message());
                Err(e)
            }
        }
    }

    /// Load `raw` unless it has already been loaded.
    ///
    /// Returns `None` when there was nothing to do.
    pub fn preload_tab(&mut self, raw: &str) -> Result<Option<LoadedContent>, TabError> {
        if self.state.is_loaded(raw) {
            return Ok(None);
        }
        self.load_content(raw).map(Some)
    }

    /// Discard cached content and loaded state for `raw`.
    ///
    /// The active tab is reloaded straight away; others load on next access.
    pub fn refresh(&mut self, raw: &str) -> Result<Option<LoadedContent>, TabError> {
        let id = self.runtime.gate().validate_identifier(raw)?.into_string();
        if !self.tabs().contains(&id) {
            return Err(TabError::NotFound(id));
        }

        self.state.reset(&id);
        let removed = self.runtime.cache().invalidate(&id, self.subject_id());
        self.runtime.events().emit(&TabEvent::Refreshed { tab_id: id.clone() });
        tracing::debug!(instance_id = %self.instance_id, tab_id = %id, removed, "tab refreshed");

        if self.state.is_active(&id) {
            self.load_content(&id).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reconcile with `location` after a reload, back/forward or deep link.
    pub fn on_navigation_reentry(&mut self, location: LocationSnapshot) -> SyncOutcome {
        self.location = location;
        let collection = self.tabs();
        self.runtime.synchronizer().sync(
            &mut self.state,
            &collection,
            &self.location,
            &self.instance_id,
            self.subject.as_ref(),
        )
    }

    /// Schedule preloading of the active tab's neighbours.
    pub fn preload_adjacent(&self) -> Vec<String> {
        self.preload_in(&self.tabs())
    }

    fn preload_in(&self, collection: &TabCollection) -> Vec<String> {
        let Some(active) = self.state.active() else {
            return Vec::new();
        };
        let sources = self.runtime.pipeline().preload_sources(collection.iter());
        self.runtime
            .cache()
            .preload_adjacent(&sources, active, self.subject_id())
    }

    /// CSRF token the host embeds in switch requests for `tab_id`.
    #[must_use]
    pub fn csrf_token(&self, tab_id: &str) -> String {
        self.runtime.gate().csrf_token(tab_id, self.session_id())
    }

    /// Response headers for pages rendering this component.
    #[must_use]
    pub fn security_headers(&self) -> Vec<(&'static str, &'static str)> {
        self.runtime.gate().security_headers()
    }
}
