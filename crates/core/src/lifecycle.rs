//! Version lifecycle: install, activate, and stale-partition collection.
//!
//! ```text
//! INSTALLING --install--> INSTALLED --activate--> ACTIVATING --> ACTIVE
//! ```
//!
//! Install bulk-adds the critical resource groups all-or-nothing. A failed
//! install leaves the engine in `INSTALLING` so the next trigger retries it.
//! Activation deletes every partition outside the current version's name set
//! and then claims clients: from `ACTIVE` on, requests route through the
//! strategies instead of passing straight to the network.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::Error;
use crate::cache::{CachedResponse, Role, request_key};
use crate::engine::CacheEngine;
use crate::network::InterceptedRequest;

/// Lifecycle state of the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
}

impl LifecycleState {
    /// Whether intercepted requests are routed through the strategies.
    pub fn is_serving(self) -> bool {
        self == LifecycleState::Active
    }
}

pub(crate) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Installing);
        Self { state, skip_waiting: AtomicBool::new(false) }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Move from `from` to `to`; false when the current state is not `from`.
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(from = ?from, to = ?to, "lifecycle transition");
        }
        moved
    }

    #[cfg(test)]
    pub(crate) fn force(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }
}

/// Result of a completed install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub version: String,
    /// Entries bulk-added into the static partition.
    pub static_entries: usize,
    /// Entries bulk-added into the offline partition.
    pub offline_entries: usize,
    /// Present when a pending skip-waiting activated the version right away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationReport>,
}

/// Result of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct ActivationReport {
    pub version: String,
    /// Stale partitions deleted.
    pub deleted: Vec<String>,
    /// Stale partitions whose deletion failed.
    pub failed: Vec<String>,
}

fn dedup(paths: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for path in paths {
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

impl CacheEngine {
    /// Run the install step.
    ///
    /// Fetches every critical resource before writing anything, then bulk-adds
    /// the static and offline groups. Any fetch failure or non-2xx status fails
    /// the step and nothing is written.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` outside `INSTALLING`, `Error::InstallFailed` when a
    /// resource cannot be fetched, or a store error from the bulk-add.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let state = self.lifecycle_state();
        if state != LifecycleState::Installing {
            return Err(Error::InvalidState(format!("install requires INSTALLING, engine is {state:?}")));
        }

        let config = self.config();
        let static_group = dedup(config.precache_static.iter().cloned());
        let offline_group =
            dedup(std::iter::once(config.offline_document.clone()).chain(config.precache_offline.iter().cloned()));

        let static_entries = self.fetch_group(&static_group).await?;
        let offline_entries = self.fetch_group(&offline_group).await?;
        let counts = (static_entries.len(), offline_entries.len());

        self.store()
            .open_partition(&self.partition_name(Role::Static))
            .await?
            .put_all(static_entries)
            .await?;
        self.store()
            .open_partition(&self.partition_name(Role::Offline))
            .await?
            .put_all(offline_entries)
            .await?;

        self.lifecycle()
            .transition(LifecycleState::Installing, LifecycleState::Installed);

        let activation = if self.lifecycle().skip_waiting.load(Ordering::SeqCst) {
            Some(self.activate().await?)
        } else {
            None
        };

        Ok(InstallReport {
            version: config.partitions.version().to_string(),
            static_entries: counts.0,
            offline_entries: counts.1,
            activation,
        })
    }

    /// Fetch one bulk-add group concurrently; the first failure aborts the group.
    async fn fetch_group(&self, paths: &[String]) -> Result<Vec<(String, CachedResponse)>, Error> {
        let mut requests = Vec::with_capacity(paths.len());
        for path in paths {
            let url = self
                .resolve_url(path)
                .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))?;
            requests.push(InterceptedRequest::get(url));
        }

        let mut join_set = JoinSet::new();
        for request in requests {
            let engine = self.clone();
            join_set.spawn(async move {
                let key = engine.request_key(&request);
                let result = engine.fetch_network(&request).await;
                (request.url, key, result)
            });
        }

        let mut entries = Vec::with_capacity(paths.len());
        while let Some(joined) = join_set.join_next().await {
            let (url, key, result) = joined.map_err(|e| Error::InstallFailed(format!("fetch task failed: {e}")))?;
            match result {
                Ok(response) if response.is_ok() => entries.push((key, response)),
                Ok(response) => {
                    return Err(Error::InstallFailed(format!("{url}: HTTP {}", response.status)));
                }
                Err(e) => return Err(Error::InstallFailed(format!("{url}: {e}"))),
            }
        }
        Ok(entries)
    }

    /// Activate the installed version.
    ///
    /// Deletes every partition whose name is outside the current version's
    /// set. Individual deletion failures are logged and reported, never fatal.
    /// Activating an already active engine is a no-op.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` while installing or while another activation is
    /// running; a store error when partitions cannot be enumerated.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let version = self.config().partitions.version().to_string();
        match self.lifecycle_state() {
            LifecycleState::Active => return Ok(ActivationReport { version, ..Default::default() }),
            LifecycleState::Installing => {
                return Err(Error::InvalidState("activate requires a completed install".into()));
            }
            LifecycleState::Activating | LifecycleState::Installed => {}
        }
        if !self
            .lifecycle()
            .transition(LifecycleState::Installed, LifecycleState::Activating)
        {
            return Err(Error::InvalidState("activation already in progress".into()));
        }

        let current = self.config().partitions.current_names();
        let existing = match self.store().partition_names().await {
            Ok(names) => names,
            Err(e) => {
                self.lifecycle()
                    .transition(LifecycleState::Activating, LifecycleState::Installed);
                return Err(e);
            }
        };

        let mut report = ActivationReport { version, ..Default::default() };
        for name in existing.into_iter().filter(|n| !current.contains(n)) {
            match self.store().delete_partition(&name).await {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    tracing::warn!(partition = %name, "failed to delete stale partition: {e}");
                    report.failed.push(name);
                }
            }
        }

        self.lifecycle()
            .transition(LifecycleState::Activating, LifecycleState::Active);
        tracing::info!(
            version = %report.version,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "activated version"
        );
        Ok(report)
    }

    /// Skip waiting for existing clients.
    ///
    /// Activates immediately when installed; during install the request is
    /// recorded and honored as soon as install completes.
    ///
    /// # Errors
    ///
    /// Propagates activation failures.
    pub async fn skip_waiting(&self) -> Result<LifecycleState, Error> {
        self.lifecycle().skip_waiting.store(true, Ordering::SeqCst);
        if self.lifecycle_state() == LifecycleState::Installed {
            self.activate().await?;
        }
        Ok(self.lifecycle_state())
    }

    /// Cache key of the offline document.
    pub fn offline_document_key(&self) -> Result<String, Error> {
        let url = self.resolve_url(&self.config().offline_document)?;
        Ok(request_key("GET", &url, &self.config().volatile_params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::{PartitionStore, VersionedPartitions};
    use crate::engine::EngineConfig;
    use crate::testing::{ScriptedNetwork, test_config};

    fn installing_config() -> EngineConfig {
        EngineConfig { precache_static: vec!["/".into(), "/manifest.json".into()], ..test_config() }
    }

    fn scripted_origin() -> Arc<ScriptedNetwork> {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/", 200, "<html>home</html>");
        network.respond("/manifest.json", 200, "{}");
        network.respond("/offline.html", 200, "<h1>offline</h1>");
        network
    }

    #[tokio::test]
    async fn test_install_populates_partitions() {
        let network = scripted_origin();
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, network.clone(), installing_config());

        let report = engine.install().await.unwrap();
        assert_eq!(report.static_entries, 2);
        assert_eq!(report.offline_entries, 1);
        assert!(report.activation.is_none());
        assert_eq!(engine.lifecycle_state(), LifecycleState::Installed);

        let offline = engine.store().open_partition(&engine.partition_name(Role::Offline)).await.unwrap();
        let doc = offline.lookup(&engine.offline_document_key().unwrap()).await.unwrap().unwrap();
        assert_eq!(doc.text(), "<h1>offline</h1>");
        assert_eq!(network.calls(), 3);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let network = scripted_origin();
        network.fail("/manifest.json");
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, network.clone(), installing_config());

        let err = engine.install().await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));
        assert_eq!(engine.lifecycle_state(), LifecycleState::Installing);
        assert!(engine.store().partition_names().await.unwrap().is_empty());

        network.respond("/manifest.json", 200, "{}");
        engine.install().await.unwrap();
        assert_eq!(engine.lifecycle_state(), LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let network = scripted_origin();
        network.respond("/offline.html", 404, "missing");
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, network, installing_config());

        assert!(matches!(engine.install().await, Err(Error::InstallFailed(_))));
    }

    #[tokio::test]
    async fn test_activation_safety() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        for name in ["static-pwa-v1.0.0", "dynamic-pwa-v1.0.0", "static-pwa-v2.0.0", "dynamic-pwa-v2.0.0"] {
            store.open_partition(name).await.unwrap();
        }
        let config = EngineConfig { partitions: VersionedPartitions::new("pwa", "2.0.0").unwrap(), ..test_config() };
        let engine = CacheEngine::new(store, scripted_origin(), config);
        engine.lifecycle().force(LifecycleState::Installed);

        let report = engine.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["static-pwa-v1.0.0", "dynamic-pwa-v1.0.0"]);
        assert!(report.failed.is_empty());
        assert_eq!(
            engine.store().partition_names().await.unwrap(),
            vec!["static-pwa-v2.0.0", "dynamic-pwa-v2.0.0"]
        );
        assert_eq!(engine.lifecycle_state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_precached_root_served_offline() {
        let network = scripted_origin();
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, network.clone(), installing_config());
        engine.install().await.unwrap();
        engine.activate().await.unwrap();

        network.fail("/");
        let root = engine.resolve_url("/").unwrap();
        let navigation = engine.intercept(InterceptedRequest::navigation(root.clone())).await;
        assert_eq!(navigation.response.status, 200);
        assert_eq!(navigation.response.text(), "<html>home</html>");

        let subresource = engine.intercept(InterceptedRequest::get(root)).await;
        assert_eq!(subresource.response.status, 200);
        assert_eq!(subresource.response.text(), "<html>home</html>");
        engine.drain_background().await;
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, scripted_origin(), test_config());

        assert!(matches!(engine.activate().await, Err(Error::InvalidState(_))));
        assert_eq!(engine.lifecycle_state(), LifecycleState::Installing);
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, scripted_origin(), installing_config());
        engine.install().await.unwrap();

        engine.activate().await.unwrap();
        let again = engine.activate().await.unwrap();
        assert!(again.deleted.is_empty());
        assert_eq!(engine.lifecycle_state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_during_install() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, scripted_origin(), installing_config());

        assert_eq!(engine.skip_waiting().await.unwrap(), LifecycleState::Installing);
        let report = engine.install().await.unwrap();
        assert!(report.activation.is_some());
        assert_eq!(engine.lifecycle_state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_when_installed() {
        let store = PartitionStore::open_in_memory().await.unwrap();
        let engine = CacheEngine::new(store, scripted_origin(), installing_config());
        engine.install().await.unwrap();
        let mut states = engine.subscribe_lifecycle();

        assert_eq!(engine.skip_waiting().await.unwrap(), LifecycleState::Active);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), LifecycleState::Active);
    }

    #[test]
    fn test_state_serializes_upper_snake() {
        assert_eq!(serde_json::to_string(&LifecycleState::Installed).unwrap(), "\"INSTALLED\"");
    }
}
