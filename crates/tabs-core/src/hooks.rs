//! The load and switch pipeline around a tab's content producer.
//!
//! Loading runs, in order: access check, `before_load`, cache lookup,
//! produce, `after_load`, sanitize, cache store. A failure while producing
//! or in `after_load` goes to `on_error`, whose fallback content (if any)
//! turns the failure into a success. Switching runs `on_switch` only.
//!
//! Hooks and producers are user code. A panic in any of them is caught here
//! and treated as a failure of that stage, so nothing unwinds into the host.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tabs_cache::{BoxError, ContentCache, PreloadSource};
use tabs_security::{Access, SecurityGate, Subject};

use crate::definition::{HookContext, HookDecision, ProduceError, SwitchContext, TabDefinition};
use crate::error::TabError;
use crate::events::{EventDispatcher, EventSink, TabEvent};

/// Successful result of a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedContent {
    pub tab_id: String,
    pub content: String,
    /// Served from the content cache without producing.
    pub used_cache: bool,
    /// Supplied by the `on_error` hook after a failed production.
    pub fallback: bool,
}

fn guarded<T>(f: impl FnOnce() -> T) -> Option<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).ok()
}

/// Runs tab hooks around content production.
#[derive(Debug)]
pub struct HookPipeline {
    gate: Arc<SecurityGate>,
    cache: ContentCache,
    events: EventDispatcher,
    debug: bool,
}

impl HookPipeline {
    /// Create a pipeline.
    ///
    /// `dispatch_events` gates the before/after-load notifications; `debug`
    /// traces every hook invocation.
    pub fn new(
        gate: Arc<SecurityGate>,
        cache: ContentCache,
        sink: Arc<dyn EventSink>,
        dispatch_events: bool,
        debug: bool,
    ) -> Self {
        Self {
            gate,
            cache,
            events: EventDispatcher::new(sink, dispatch_events),
            debug,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Preload sources for `tabs`, in order.
    ///
    /// Preloaded content is sanitized like loaded content since later loads
    /// serve it straight from the cache.
    #[must_use]
    pub fn preload_sources<'a>(
        &self,
        tabs: impl IntoIterator<Item = &'a Arc<TabDefinition>>,
    ) -> Vec<Arc<dyn PreloadSource>> {
        tabs.into_iter()
            .map(|tab| {
                Arc::new(SanitizedPreload {
                    tab: Arc::clone(tab),
                    gate: Arc::clone(&self.gate),
                }) as Arc<dyn PreloadSource>
            })
            .collect()
    }

    fn trace(&self, hook: &'static str, tab_id: &str) {
        if self.debug {
            tracing::debug!(tab_id, hook, "executing hook");
        }
    }

    /// Access check shared by loading and switching.
    pub fn authorize(&self, tab: &TabDefinition, subject: Option<&Subject>) -> Result<(), TabError> {
        match self.gate.authorize(&tab.access_target(), subject) {
            Access::Allowed => Ok(()),
            Access::Denied(reason) => Err(TabError::denied(tab.id(), reason)),
        }
    }

    /// Materialize a tab's content.
    pub fn load(
        &self,
        tab: &TabDefinition,
        subject: Option<&Subject>,
    ) -> Result<LoadedContent, TabError> {
        let tab_id = tab.id();
        self.authorize(tab, subject)?;

        let ctx = HookContext { tab_id, subject };
        if let Some(hook) = &tab.hooks().before_load {
            self.trace("before_load", tab_id);
            match guarded(|| hook(&ctx)) {
                Some(HookDecision::Continue) => {}
                Some(HookDecision::Cancel(message)) => {
                    tracing::debug!(tab_id, %message, "load cancelled by before_load");
                    return Err(TabError::Cancelled(message));
                }
                None => {
                    tracing::warn!(tab_id, "before_load hook panicked");
                    return Err(TabError::Cancelled(
                        "Tab loading cancelled by beforeLoad hook".to_owned(),
                    ));
                }
            }
        }

        self.events.emit(&TabEvent::BeforeLoad {
            tab_id: tab_id.to_owned(),
            label: guarded(|| tab.label()).unwrap_or_else(|| tab_id.to_owned()),
        });

        let subject_id = subject.map(|s| s.id.as_str());
        if let Some(content) = self.cache.get(tab_id, subject_id) {
            return Ok(self.finish(tab_id, content, true, false));
        }

        match self.produce(tab, &ctx) {
            Ok(content) => {
                let content = self.gate.sanitize(&content).into_owned();
                self.cache.put(tab_id, subject_id, &content);
                Ok(self.finish(tab_id, content, false, false))
            }
            Err(err) => {
                tracing::error!(tab_id, error = %err, "content production failed");
                match self.on_error(tab, &ctx, &err) {
                    Some(fallback) => {
                        let fallback = self.gate.sanitize(&fallback).into_owned();
                        Ok(self.finish(tab_id, fallback, false, true))
                    }
                    None => Err(TabError::ProductionFailed(err.message().to_owned())),
                }
            }
        }
    }

    fn produce(&self, tab: &TabDefinition, ctx: &HookContext<'_>) -> Result<String, ProduceError> {
        let content = guarded(|| tab.produce())
            .unwrap_or_else(|| Err(ProduceError::new("content producer panicked")))?;

        let Some(hook) = &tab.hooks().after_load else {
            return Ok(content);
        };
        self.trace("after_load", ctx.tab_id);
        match guarded(|| hook(ctx, &content)) {
            Some(Some(replacement)) => Ok(replacement),
            Some(None) => Ok(content),
            None => Err(ProduceError::new("afterLoad hook failed")),
        }
    }

    fn on_error(
        &self,
        tab: &TabDefinition,
        ctx: &HookContext<'_>,
        err: &ProduceError,
    ) -> Option<String> {
        let hook = tab.hooks().on_error.as_ref()?;
        self.trace("on_error", ctx.tab_id);
        guarded(|| hook(ctx, err)).unwrap_or_else(|| {
            tracing::warn!(tab_id = ctx.tab_id, "on_error hook panicked");
            None
        })
    }

    fn finish(&self, tab_id: &str, content: String, used_cache: bool, fallback: bool) -> LoadedContent {
        self.events.emit(&TabEvent::AfterLoad {
            tab_id: tab_id.to_owned(),
            content_length: content.len(),
            used_cache,
        });
        LoadedContent {
            tab_id: tab_id.to_owned(),
            content,
            used_cache,
            fallback,
        }
    }

    /// Give the target tab's `on_switch` hook a chance to veto.
    pub fn before_switch(&self, tab: &TabDefinition, ctx: &SwitchContext<'_>) -> Result<(), TabError> {
        let Some(hook) = &tab.hooks().on_switch else {
            return Ok(());
        };
        self.trace("on_switch", ctx.to);
        match guarded(|| hook(ctx)) {
            Some(HookDecision::Continue) => Ok(()),
            Some(HookDecision::Cancel(message)) => Err(TabError::Cancelled(message)),
            None => {
                tracing::warn!(tab_id = ctx.to, "on_switch hook panicked");
                Err(TabError::Cancelled("Tab switch cancelled".to_owned()))
            }
        }
    }
}

struct SanitizedPreload {
    tab: Arc<TabDefinition>,
    gate: Arc<SecurityGate>,
}

impl PreloadSource for SanitizedPreload {
    fn id(&self) -> &str {
        self.tab.id()
    }

    fn is_disabled(&self) -> bool {
        self.tab.is_disabled()
    }

    fn produce(&self) -> Result<String, BoxError> {
        let content = self.tab.produce()?;
        Ok(self.gate.sanitize(&content).into_owned())
    }
}
