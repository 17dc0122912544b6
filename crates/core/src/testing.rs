//! Test doubles for the network seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use url::Url;

use crate::Error;
use crate::cache::{CachedResponse, PartitionStore, VersionedPartitions, VolatileParams};
use crate::engine::{CacheEngine, EngineConfig};
use crate::eviction::EvictionBudget;
use crate::lifecycle::LifecycleState;
use crate::network::{InterceptedRequest, Network};
use crate::strategy::RuleSet;

enum Script {
    Respond(CachedResponse),
    Fail,
    Panic,
}

/// Network double keyed by URL path. Unscripted paths fail like a dropped
/// connection.
pub(crate) struct ScriptedNetwork {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self { scripts: Mutex::default(), calls: Mutex::default(), total: AtomicUsize::new(0), gate: None }
    }

    /// A network whose fetches wait for a permit on the returned gate.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: Some(gate.clone()), ..Self::new() }, gate)
    }

    pub(crate) fn respond(&self, path: &str, status: u16, body: &'static str) {
        let response = CachedResponse::new(status, body)
            .with_header("content-type", "text/plain")
            .with_header("content-length", body.len().to_string());
        self.respond_with(path, response);
    }

    pub(crate) fn respond_with(&self, path: &str, response: CachedResponse) {
        self.scripts.lock().unwrap().insert(path.to_string(), Script::Respond(response));
    }

    pub(crate) fn fail(&self, path: &str) {
        self.scripts.lock().unwrap().insert(path.to_string(), Script::Fail);
    }

    /// Fetching `path` panics the calling task.
    pub(crate) fn panic_on(&self, path: &str) {
        self.scripts.lock().unwrap().insert(path.to_string(), Script::Panic);
    }

    pub(crate) fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|e| Error::Network(e.to_string()))?.forget();
        }

        let scripted = match self.scripts.lock().unwrap().get(&path) {
            Some(Script::Respond(response)) => Some(Ok(response.clone())),
            Some(Script::Fail) => Some(Err(Error::Network(format!("connection refused: {path}")))),
            Some(Script::Panic) => None,
            None => Some(Err(Error::Network(format!("no route to {path}")))),
        };
        scripted.unwrap_or_else(|| panic!("scripted panic fetching {path}"))
    }
}

pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        origin: Url::parse("https://app.example.com").unwrap(),
        partitions: VersionedPartitions::new("pwa", "1.0.0").unwrap(),
        rules: RuleSet::default(),
        volatile_params: VolatileParams::default(),
        offline_document: "/offline.html".into(),
        precache_static: Vec::new(),
        precache_offline: Vec::new(),
        budget: EvictionBudget::default(),
        eviction_entry_threshold: None,
        market_resources: vec!["/markets/{market}".into(), "/api/markets/{market}.json".into()],
        preload_concurrency: 4,
    }
}

/// In-memory engine already serving requests, with nothing precached.
pub(crate) async fn active_engine(network: Arc<ScriptedNetwork>) -> CacheEngine {
    active_engine_with(network, test_config()).await
}

pub(crate) async fn active_engine_with(network: Arc<ScriptedNetwork>, config: EngineConfig) -> CacheEngine {
    let store = PartitionStore::open_in_memory().await.unwrap();
    let engine = CacheEngine::new(store, network, config);
    engine.lifecycle().force(LifecycleState::Active);
    engine
}
