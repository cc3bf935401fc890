//! Lifecycle notifications.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// What triggered an active-tab change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// An explicit switch request.
    Switch,
    /// A navigation re-entry (reload, back/forward, deep link).
    Navigation,
}

/// Notification emitted by a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TabEvent {
    Init {
        instance_id: String,
        tabs_count: usize,
        active: Option<String>,
    },
    BeforeLoad {
        tab_id: String,
        label: String,
    },
    AfterLoad {
        tab_id: String,
        content_length: usize,
        used_cache: bool,
    },
    Changed {
        old: Option<String>,
        new: String,
        source: ChangeSource,
    },
    Refreshed {
        tab_id: String,
    },
}

impl TabEvent {
    /// Global lifecycle events are only dispatched when enabled.
    /// Change and refresh notifications always are.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Self::Init { .. } | Self::BeforeLoad { .. } | Self::AfterLoad { .. }
        )
    }
}

/// Receiver of [`TabEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TabEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &TabEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<TabEvent>>,
}

impl MemoryEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TabEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every recorded event.
    pub fn take(&self) -> Vec<TabEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &TabEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Writes each event to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &TabEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(event = %json, "tab event"),
            Err(e) => tracing::warn!(error = %e, "failed to encode tab event"),
        }
    }
}

/// Routes events to a sink, filtering global ones when dispatch is off.
#[derive(Clone)]
pub(crate) struct EventDispatcher {
    sink: Arc<dyn EventSink>,
    dispatch_global: bool,
}

impl EventDispatcher {
    pub(crate) fn new(sink: Arc<dyn EventSink>, dispatch_global: bool) -> Self {
        Self {
            sink,
            dispatch_global,
        }
    }

    pub(crate) fn emit(&self, event: &TabEvent) {
        if event.is_global() && !self.dispatch_global {
            return;
        }
        self.sink.emit(event);
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("dispatch_global", &self.dispatch_global)
            .finish_non_exhaustive()
    }
}
