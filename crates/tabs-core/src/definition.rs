//! Tab definitions and their lifecycle hooks.
//!
//! A [`TabDefinition`] is built once per render pass by the host's factory
//! and never changes afterwards. Everything dynamic about a tab (label,
//! badge, visibility, content) is expressed as a [`Value`] or a callable that
//! is evaluated on demand.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tabs_security::{AccessTarget, InvalidIdentifier, Subject, TabId, escape_html};

use crate::value::Value;

/// Content shown for a tab that has neither a producer nor a remote component.
pub const EMPTY_CONTENT: &str = r#"<p class="text-gray-500">No content available for this tab.</p>"#;

/// Error returned by a content producer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProduceError {
    message: String,
}

impl ProduceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProduceError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProduceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Violation of a definition-time invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid tab id {id:?}: {source}")]
    InvalidId {
        id: String,
        source: InvalidIdentifier,
    },
    #[error("tab '{0}' sets both a content producer and a remote component")]
    ConflictingContent(String),
}

/// Verdict of a hook that can veto an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Cancel(String),
}

impl HookDecision {
    pub fn cancel(message: impl Into<String>) -> Self {
        Self::Cancel(message.into())
    }
}

/// Context passed to load hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub tab_id: &'a str,
    pub subject: Option<&'a Subject>,
}

/// Context passed to the switch hook.
#[derive(Debug, Clone, Copy)]
pub struct SwitchContext<'a> {
    /// Tab active before the switch, if any.
    pub from: Option<&'a str>,
    pub to: &'a str,
    pub instance_id: &'a str,
    pub subject: Option<&'a Subject>,
}

pub type Producer = Arc<dyn Fn() -> Result<String, ProduceError> + Send + Sync>;
pub type VisibilityFn = Arc<dyn Fn(Option<&Subject>) -> bool + Send + Sync>;
pub type BeforeLoadHook = Arc<dyn Fn(&HookContext<'_>) -> HookDecision + Send + Sync>;
pub type AfterLoadHook = Arc<dyn Fn(&HookContext<'_>, &str) -> Option<String> + Send + Sync>;
pub type OnErrorHook =
    Arc<dyn Fn(&HookContext<'_>, &ProduceError) -> Option<String> + Send + Sync>;
pub type OnSwitchHook = Arc<dyn Fn(&SwitchContext<'_>) -> HookDecision + Send + Sync>;

/// Reference to a component rendered by the host, with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteComponent {
    pub name: String,
    pub params: Map<String, JsonValue>,
}

impl RemoteComponent {
    /// Markup the host replaces with the mounted component.
    #[must_use]
    pub fn placeholder(&self, tab_id: &str) -> String {
        let params = JsonValue::Object(self.params.clone()).to_string();
        format!(
            r#"<div data-tab-id="{}" data-remote-component="{}" data-params="{}"></div>"#,
            escape_html(tab_id),
            escape_html(&self.name),
            escape_html(&params),
        )
    }
}

/// Where a tab's content comes from.
#[derive(Clone, Default)]
pub enum ContentSource {
    #[default]
    Empty,
    Producer(Producer),
    Remote(RemoteComponent),
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Producer(_) => f.write_str("Producer(..)"),
            Self::Remote(remote) => f.debug_tuple("Remote").field(remote).finish(),
        }
    }
}

/// The four optional lifecycle hooks of a tab.
#[derive(Clone, Default)]
pub struct TabHooks {
    pub before_load: Option<BeforeLoadHook>,
    pub after_load: Option<AfterLoadHook>,
    pub on_error: Option<OnErrorHook>,
    pub on_switch: Option<OnSwitchHook>,
}

impl fmt::Debug for TabHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabHooks")
            .field("before_load", &self.before_load.is_some())
            .field("after_load", &self.after_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_switch", &self.on_switch.is_some())
            .finish()
    }
}

/// Immutable description of one tab.
#[derive(Clone)]
pub struct TabDefinition {
    id: String,
    label: Value<String>,
    icon: Option<Value<String>>,
    badge: Option<Value<String>>,
    disabled: bool,
    visible: Option<VisibilityFn>,
    permissions: Vec<String>,
    content: ContentSource,
    hooks: TabHooks,
}

impl fmt::Debug for TabDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("disabled", &self.disabled)
            .field("permissions", &self.permissions)
            .field("content", &self.content)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl TabDefinition {
    /// Start building a tab. The label defaults to the id.
    pub fn builder(id: impl Into<String>) -> TabBuilder {
        TabBuilder::new(id.into())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.label.evaluate()
    }

    #[must_use]
    pub fn icon(&self) -> Option<String> {
        self.icon.as_ref().map(Value::evaluate)
    }

    #[must_use]
    pub fn badge(&self) -> Option<String> {
        self.badge.as_ref().map(Value::evaluate)
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    #[must_use]
    pub fn content_source(&self) -> &ContentSource {
        &self.content
    }

    #[must_use]
    pub fn hooks(&self) -> &TabHooks {
        &self.hooks
    }

    /// Evaluate the visibility predicate. Tabs without one are visible.
    ///
    /// The predicate may panic; callers that need to fail closed go through
    /// [`TabCollection`](crate::TabCollection), which treats that as hidden.
    #[must_use]
    pub fn is_visible(&self, subject: Option<&Subject>) -> bool {
        self.visible.as_ref().is_none_or(|f| f(subject))
    }

    /// Access decision input for this tab.
    #[must_use]
    pub fn access_target(&self) -> AccessTarget<'_> {
        AccessTarget {
            id: &self.id,
            disabled: self.disabled,
            permissions: &self.permissions,
        }
    }

    /// Produce the tab's content without running any hook.
    pub fn produce(&self) -> Result<String, ProduceError> {
        match &self.content {
            ContentSource::Producer(f) => f(),
            ContentSource::Remote(remote) => Ok(remote.placeholder(&self.id)),
            ContentSource::Empty => Ok(EMPTY_CONTENT.to_owned()),
        }
    }
}

/// Builder for [`TabDefinition`].
#[must_use]
pub struct TabBuilder {
    id: String,
    label: Option<Value<String>>,
    icon: Option<Value<String>>,
    badge: Option<Value<String>>,
    disabled: bool,
    visible: Option<VisibilityFn>,
    permissions: Vec<String>,
    producer: Option<Producer>,
    remote: Option<RemoteComponent>,
    hooks: TabHooks,
}

impl TabBuilder {
    fn new(id: String) -> Self {
        Self {
            id,
            label: None,
            icon: None,
            badge: None,
            disabled: false,
            visible: None,
            permissions: Vec::new(),
            producer: None,
            remote: None,
            hooks: TabHooks::default(),
        }
    }

    pub fn label(mut self, label: impl Into<Value<String>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<Value<String>>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn badge(mut self, badge: impl Into<Value<String>>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn visible(mut self, f: impl Fn(Option<&Subject>) -> bool + Send + Sync + 'static) -> Self {
        self.visible = Some(Arc::new(f));
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Content produced on demand.
    pub fn content(
        mut self,
        f: impl Fn() -> Result<String, ProduceError> + Send + Sync + 'static,
    ) -> Self {
        self.producer = Some(Arc::new(f));
        self
    }

    /// Fixed content.
    pub fn html(self, html: impl Into<String>) -> Self {
        let html = html.into();
        self.content(move || Ok(html.clone()))
    }

    /// Content rendered by a host component.
    pub fn remote(mut self, name: impl Into<String>, params: Map<String, JsonValue>) -> Self {
        self.remote = Some(RemoteComponent {
            name: name.into(),
            params,
        });
        self
    }

    pub fn before_load(
        mut self,
        f: impl Fn(&HookContext<'_>) -> HookDecision + Send + Sync + 'static,
    ) -> Self {
        self.hooks.before_load = Some(Arc::new(f));
        self
    }

    pub fn after_load(
        mut self,
        f: impl Fn(&HookContext<'_>, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.after_load = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&HookContext<'_>, &ProduceError) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_switch(
        mut self,
        f: impl Fn(&SwitchContext<'_>) -> HookDecision + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_switch = Some(Arc::new(f));
        self
    }

    /// Check the definition invariants and build.
    pub fn build(self) -> Result<TabDefinition, DefinitionError> {
        let id = TabId::parse(&self.id)
            .map_err(|source| DefinitionError::InvalidId {
                id: self.id.clone(),
                source,
            })?
            .into_string();

        let content = match (self.producer, self.remote) {
            (Some(_), Some(_)) => return Err(DefinitionError::ConflictingContent(id)),
            (Some(f), None) => ContentSource::Producer(f),
            (None, Some(remote)) => ContentSource::Remote(remote),
            (None, None) => ContentSource::Empty,
        };

        Ok(TabDefinition {
            label: self.label.unwrap_or_else(|| Value::Literal(id.clone())),
            id,
            icon: self.icon,
            badge: self.badge,
            disabled: self.disabled,
            visible: self.visible,
            permissions: self.permissions,
            content,
            hooks: self.hooks,
        })
    }
}
