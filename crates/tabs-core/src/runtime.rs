//! Process-wide services shared by every tabs component.

use std::sync::Arc;

use tabs_cache::{
    CacheSettings, ContentCache, FileStore, KeyValueStore, MemoryStore, NullStore,
    PreloadExecutor, ThreadExecutor,
};
use tabs_config::{CacheBackend, CacheConfig, Config, NavigationMode};
use tabs_security::SecurityGate;

use crate::component::TabsComponent;
use crate::events::{EventDispatcher, EventSink, LogEventSink};
use crate::hooks::HookPipeline;
use crate::location::{NavigationRequest, NullRouter, Router};
use crate::navigation::NavigationSynchronizer;
use crate::registry::TabRegistry;
use crate::resolver::ActiveTabResolver;
use crate::session::{MemorySessionStore, SessionStore};

/// Version stamp for the file cache. Entries written by other versions are
/// discarded on startup.
pub const CACHE_VERSION: &str = concat!("tabs-", env!("CARGO_PKG_VERSION"));

/// Shared services, built once from configuration.
///
/// Cloning is cheap: every service sits behind an `Arc`, so clones share the
/// cache, rate-limit counters, debouncer and session store.
#[derive(Clone)]
pub struct TabsRuntime {
    gate: Arc<SecurityGate>,
    cache: ContentCache,
    pipeline: Arc<HookPipeline>,
    resolver: Arc<ActiveTabResolver>,
    synchronizer: Arc<NavigationSynchronizer>,
    router: Arc<dyn Router>,
    events: EventDispatcher,
    mode: NavigationMode,
    push_history: bool,
}

impl std::fmt::Debug for TabsRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabsRuntime")
            .field("cache", &self.cache)
            .field("resolver", &self.resolver)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl TabsRuntime {
    /// Build a runtime with default collaborators.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::builder(config).build()
    }

    /// Start building a runtime with custom collaborators.
    pub fn builder(config: &Config) -> RuntimeBuilder<'_> {
        RuntimeBuilder {
            config,
            gate: None,
            store: None,
            executor: None,
            session: None,
            router: None,
            events: None,
        }
    }

    /// Create a component for one UI instance.
    #[must_use]
    pub fn component(&self, instance_id: impl Into<String>, registry: TabRegistry) -> TabsComponent {
        TabsComponent::new(self.clone(), instance_id.into(), registry)
    }

    #[must_use]
    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    #[must_use]
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    #[must_use]
    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn resolver(&self) -> &ActiveTabResolver {
        &self.resolver
    }

    #[must_use]
    pub fn synchronizer(&self) -> &NavigationSynchronizer {
        &self.synchronizer
    }

    pub(crate) fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Ask the router to move to `url`.
    pub(crate) fn navigate(&self, url: &str) {
        self.router.navigate(&NavigationRequest {
            url: url.to_owned(),
            mode: self.mode,
            push_history: self.push_history,
        });
    }
}

/// Builder for [`TabsRuntime`].
#[must_use]
pub struct RuntimeBuilder<'a> {
    config: &'a Config,
    gate: Option<SecurityGate>,
    store: Option<Arc<dyn KeyValueStore>>,
    executor: Option<Arc<dyn PreloadExecutor>>,
    session: Option<Arc<dyn SessionStore>>,
    router: Option<Arc<dyn Router>>,
    events: Option<Arc<dyn EventSink>>,
}

impl RuntimeBuilder<'_> {
    /// Use a preconfigured security gate (custom checks, resolvers).
    pub fn security(mut self, gate: SecurityGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Use `store` instead of the configured cache backend.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn preload_executor(mut self, executor: Arc<dyn PreloadExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    #[must_use]
    pub fn build(self) -> TabsRuntime {
        let config = self.config;
        let gate = Arc::new(self.gate.unwrap_or_else(|| {
            SecurityGate::from_config(&config.security, &config.performance)
        }));

        let store = self.store.unwrap_or_else(|| store_from_config(&config.cache));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ThreadExecutor) as Arc<dyn PreloadExecutor>);
        let cache = ContentCache::with_executor(
            store,
            CacheSettings {
                enabled: config.cache.enabled,
                ttl: config.cache.ttl(),
                namespace: config.cache.namespace.clone(),
                tags: config.cache.tags,
                per_subject: config.cache.per_subject,
                preload_adjacent: config.performance.preload_adjacent,
            },
            executor,
        );

        let sink = self
            .events
            .unwrap_or_else(|| Arc::new(LogEventSink) as Arc<dyn EventSink>);
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>);

        let resolver = Arc::new(ActiveTabResolver::new(
            Arc::clone(&gate),
            &config.navigation,
            session,
        ));
        let synchronizer = Arc::new(NavigationSynchronizer::new(
            Arc::clone(&resolver),
            Arc::clone(&sink),
        ));
        let pipeline = Arc::new(HookPipeline::new(
            Arc::clone(&gate),
            cache.clone(),
            Arc::clone(&sink),
            config.hooks.dispatch_events,
            config.hooks.debug,
        ));

        tracing::debug!(
            cache = cache.stats().backend,
            cache_enabled = cache.is_enabled(),
            routable = config.navigation.routable,
            "tabs runtime ready"
        );

        TabsRuntime {
            gate,
            cache,
            pipeline,
            resolver,
            synchronizer,
            router: self
                .router
                .unwrap_or_else(|| Arc::new(NullRouter) as Arc<dyn Router>),
            events: EventDispatcher::new(sink, config.hooks.dispatch_events),
            mode: config.navigation.mode,
            push_history: config.navigation.browser_history,
        }
    }
}

/// Backing store for the configured cache backend.
///
/// A disabled cache never touches the file system.
fn store_from_config(cache: &CacheConfig) -> Arc<dyn KeyValueStore> {
    if !cache.enabled {
        return Arc::new(NullStore);
    }
    match cache.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::File => Arc::new(FileStore::new(cache.dir.clone(), CACHE_VERSION)),
        CacheBackend::None => Arc::new(NullStore),
    }
}
