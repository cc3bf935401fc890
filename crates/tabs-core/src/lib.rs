//! Tabbed UI engine core.
//!
//! This crate turns a host-supplied list of [`TabDefinition`]s into a stateful
//! tab set per UI instance:
//!
//! - [`ActiveTabResolver`]: picks the active tab from explicit, URL,
//!   remembered and default candidates
//! - [`NavigationSynchronizer`]: keeps the active tab and the location in sync
//! - [`HookPipeline`]: runs `before_load`, produce, `after_load` and
//!   `on_error` around content production, with caching
//! - [`TabsComponent`]: per-instance facade exposing the UI operations
//!
//! Shared services live in a [`TabsRuntime`], built once from [`Config`].
//!
//! # Quick Start
//!
//! ```
//! use tabs_core::{Config, TabDefinition, TabRegistry, TabsRuntime};
//!
//! let runtime = TabsRuntime::from_config(&Config::default());
//! let registry = TabRegistry::new(|| {
//!     vec![
//!         TabDefinition::builder("profile").label("Profile").html("<p>Profile</p>").build().unwrap(),
//!         TabDefinition::builder("billing").label("Billing").html("<p>Billing</p>").build().unwrap(),
//!     ]
//! });
//!
//! let mut component = runtime.component("settings", registry);
//! assert_eq!(component.mount(None).as_deref(), Some("profile"));
//!
//! let loaded = component.load_content("billing").unwrap();
//! assert_eq!(loaded.content, "<p>Billing</p>");
//! ```

mod component;
mod definition;
mod error;
mod events;
mod hooks;
mod location;
mod navigation;
mod registry;
mod resolver;
mod runtime;
mod session;
mod state;
mod value;

pub use component::{SwitchOutcome, TabsComponent};
pub use definition::{
    AfterLoadHook, BeforeLoadHook, ContentSource, DefinitionError, EMPTY_CONTENT, HookContext,
    HookDecision, OnErrorHook, OnSwitchHook, ProduceError, Producer, RemoteComponent,
    SwitchContext, TabBuilder, TabDefinition, TabHooks, VisibilityFn,
};
pub use error::{ErrorKind, TabError};
pub use events::{ChangeSource, EventSink, LogEventSink, MemoryEventSink, NullEventSink, TabEvent};
pub use hooks::{HookPipeline, LoadedContent};
pub use location::{
    LocationSnapshot, MemoryRouter, NavigationRequest, NullRouter, Router, UrlBuilder,
};
pub use navigation::{NavigationSynchronizer, SyncOutcome};
pub use registry::{TabCollection, TabRegistry};
pub use resolver::{
    ActiveTabResolver, CandidateSource, Denial, Rejection, ResolveRequest, Resolution,
};
pub use runtime::{CACHE_VERSION, RuntimeBuilder, TabsRuntime};
pub use session::{MemorySessionStore, SessionStore, remembered_tab_key};
pub use state::ComponentState;
pub use value::Value;

// Re-exported so hosts depend on a single crate
pub use tabs_cache::{
    ContentCache, FileStore, KeyValueStore, MemoryStore, NullStore, PreloadExecutor,
    ThreadExecutor,
};
pub use tabs_config::{Config, ConfigOverrides, NavigationMode};
pub use tabs_security::{
    AuthorizationCheck, CallerIdentity, DenialReason, InvalidIdentifier, PermissionResolver,
    SecurityGate, Subject,
};
