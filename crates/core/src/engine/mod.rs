//! The cache engine.
//!
//! [`CacheEngine`] is an explicitly constructed value owning the partition
//! store, the network seam, the rule configuration, and the lifecycle state.
//! It is cheap to clone; clones share everything. Hosts drive it through
//! [`CacheEngine::dispatch`] or the typed entry points directly.

mod background;
pub mod dispatch;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use url::Url;

use crate::Error;
use crate::cache::{CachedResponse, PartitionStore, Role, VersionedPartitions, VolatileParams, request_key};
use crate::config::AppConfig;
use crate::eviction::EvictionBudget;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::network::{InterceptedRequest, Network};
use crate::reconcile::{Connectivity, ConnectivityEvent};
use crate::strategy::{BypassReason, Resolved, Route, RuleSet, Strategy};

use background::BackgroundTasks;
pub use dispatch::{DispatchTable, Event, EventHandler, EventKind, EventOutcome};

/// Engine settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub origin: Url,
    pub partitions: VersionedPartitions,
    pub rules: RuleSet,
    pub volatile_params: VolatileParams,
    pub offline_document: String,
    pub precache_static: Vec<String>,
    pub precache_offline: Vec<String>,
    pub budget: EvictionBudget,
    pub eviction_entry_threshold: Option<usize>,
    pub market_resources: Vec<String>,
    pub preload_concurrency: usize,
}

impl EngineConfig {
    /// Derive engine settings from application configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for a malformed origin and
    /// `Error::InvalidPartitionName` for a malformed version or variant.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;

        Ok(Self {
            origin,
            partitions: VersionedPartitions::new(&config.variant, &config.version)?,
            rules: config.rules.clone().map(RuleSet::new).unwrap_or_default(),
            volatile_params: VolatileParams::new(config.volatile_params.clone()),
            offline_document: config.offline_document.clone(),
            precache_static: config.precache_static.clone(),
            precache_offline: config.precache_offline.clone(),
            budget: EvictionBudget { max_bytes: config.image_budget_bytes, fraction: config.eviction_fraction },
            eviction_entry_threshold: config.eviction_entry_threshold,
            market_resources: config.market_resources.clone(),
            preload_concurrency: config.preload_concurrency,
        })
    }
}

struct Inner {
    store: PartitionStore,
    network: Arc<dyn Network>,
    config: EngineConfig,
    lifecycle: Lifecycle,
    connectivity: Connectivity,
    background: BackgroundTasks,
    dispatch: DispatchTable,
}

/// Request-interception cache engine.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("origin", &self.inner.config.origin.as_str())
            .field("version", &self.inner.config.partitions.version())
            .field("state", &self.lifecycle_state())
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Create an engine with the built-in event handlers.
    pub fn new(store: PartitionStore, network: Arc<dyn Network>, config: EngineConfig) -> Self {
        Self::with_dispatch(store, network, config, DispatchTable::with_defaults())
    }

    /// Create an engine with a custom dispatch table.
    pub fn with_dispatch(
        store: PartitionStore, network: Arc<dyn Network>, config: EngineConfig, dispatch: DispatchTable,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                network,
                config,
                lifecycle: Lifecycle::new(),
                connectivity: Connectivity::new(),
                background: BackgroundTasks::default(),
                dispatch,
            }),
        }
    }

    pub fn store(&self) -> &PartitionStore {
        &self.inner.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    pub(crate) fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.inner.lifecycle.subscribe()
    }

    /// Listen for connectivity changes.
    pub fn subscribe_connectivity(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.connectivity.subscribe()
    }

    /// Resolve an absolute URL, or a path relative to the engine origin.
    pub fn resolve_url(&self, input: &str) -> Result<Url, Error> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidUrl("empty URL".into()));
        }
        self.inner
            .config
            .origin
            .join(input)
            .map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    /// Canonical cache key of a request.
    pub fn request_key(&self, request: &InterceptedRequest) -> String {
        request_key(&request.method, &request.url, &self.inner.config.volatile_params)
    }

    /// Current partition name for a role.
    pub fn partition_name(&self, role: Role) -> String {
        self.inner.config.partitions.name(role)
    }

    /// Route a request through the engine.
    ///
    /// Never fails: the result is a network response, a cached response, or
    /// an explicit synthetic error response.
    pub async fn intercept(&self, request: InterceptedRequest) -> Resolved {
        let route = match self.inner.config.rules.route(&self.inner.config.origin, &request) {
            Route::Apply(_) if !self.lifecycle_state().is_serving() => Route::Bypass(BypassReason::NotActive),
            route => route,
        };

        match route {
            Route::Bypass(reason) => self.passthrough(&request, reason).await,
            Route::Apply(strategy) => {
                let key = self.request_key(&request);
                tracing::debug!(strategy = %strategy, key = %key, "intercepted request");
                match strategy {
                    Strategy::CacheFirst => self.cache_first(&request, key).await,
                    Strategy::NetworkFirst => self.network_first(&request, key).await,
                    Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&request, key).await,
                    Strategy::CacheOnly => self.cache_only(key).await,
                }
            }
        }
    }

    /// Dispatch a host event to its registered handler.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnhandledEvent` when no handler is registered for the
    /// event kind, plus whatever the handler itself reports.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome, Error> {
        let kind = event.kind();
        let handler = self
            .inner
            .dispatch
            .handler(kind)
            .ok_or_else(|| Error::UnhandledEvent(format!("{kind:?}")))?;
        handler.handle(self, event).await
    }

    /// Wait for every detached background task (revalidations) to finish.
    ///
    /// Returns how many tasks were awaited. Callers of [`intercept`] never
    /// wait on these; hosts call this on shutdown.
    ///
    /// [`intercept`]: CacheEngine::intercept
    pub async fn drain_background(&self) -> usize {
        self.inner.background.drain().await
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.background.spawn(task);
    }

    pub(crate) async fn fetch_network(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        self.inner.network.fetch(request).await
    }
}
