//! Strategy executors.
//!
//! Network failures are caught here and never escape: each executor walks its
//! fallback chain and ends with a real, cached, or synthetic response. Store
//! errors on the read path are logged and treated as misses; write-backs run
//! on their own task so an abandoned request still completes its write.

use serde::{Deserialize, Serialize};

use super::{BypassReason, Strategy};
use crate::cache::hash::body_digest;
use crate::cache::{CachedResponse, Role};
use crate::engine::CacheEngine;
use crate::network::InterceptedRequest;

pub const OFFLINE_BODY: &str = "Offline";
pub const NETWORK_ERROR_BODY: &str = "Network Error";
pub const NOT_IN_CACHE_BODY: &str = "Not in cache";

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    Synthetic,
    Bypass,
}

/// Outcome of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub response: CachedResponse,
    pub source: ResponseSource,
    /// Strategy applied; `None` for bypassed requests.
    pub strategy: Option<Strategy>,
}

impl Resolved {
    fn network(response: CachedResponse, strategy: Strategy) -> Self {
        Self { response, source: ResponseSource::Network, strategy: Some(strategy) }
    }

    fn cached(response: CachedResponse, strategy: Strategy) -> Self {
        Self { response, source: ResponseSource::Cache, strategy: Some(strategy) }
    }

    fn synthetic(status: u16, body: &'static str, strategy: Option<Strategy>) -> Self {
        Self { response: CachedResponse::synthetic(status, body), source: ResponseSource::Synthetic, strategy }
    }
}

/// Storage role of a request under a strategy whose default role is `fallback`.
fn storage_role(request: &InterceptedRequest, fallback: Role) -> Role {
    Role::resolve(&request.url, request.accept.as_deref(), fallback)
}

impl CacheEngine {
    pub(crate) async fn cache_first(&self, request: &InterceptedRequest, key: String) -> Resolved {
        let role = storage_role(request, Role::Static);
        if let Some(hit) = self.lookup_or_any(role, &key).await {
            return Resolved::cached(hit, Strategy::CacheFirst);
        }

        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.write_back(role, key, response.clone()).await;
                }
                Resolved::network(response, Strategy::CacheFirst)
            }
            Err(e) => {
                tracing::debug!(key = %key, "cache-first miss while offline: {e}");
                Resolved::synthetic(503, OFFLINE_BODY, Some(Strategy::CacheFirst))
            }
        }
    }

    pub(crate) async fn network_first(&self, request: &InterceptedRequest, key: String) -> Resolved {
        let role = storage_role(request, Role::Dynamic);
        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.write_back(role, key, response.clone()).await;
                }
                Resolved::network(response, Strategy::NetworkFirst)
            }
            Err(e) => {
                tracing::debug!(key = %key, "network-first falling back to cache: {e}");
                if let Some(hit) = self.match_any(&key).await {
                    return Resolved::cached(hit, Strategy::NetworkFirst);
                }
                if request.navigate {
                    return self.offline_document(Strategy::NetworkFirst).await;
                }
                Resolved::synthetic(503, NETWORK_ERROR_BODY, Some(Strategy::NetworkFirst))
            }
        }
    }

    pub(crate) async fn stale_while_revalidate(&self, request: &InterceptedRequest, key: String) -> Resolved {
        let role = storage_role(request, Role::Dynamic);
        if let Some(hit) = self.lookup_or_any(role, &key).await {
            self.revalidate_in_background(request.clone(), role, key);
            return Resolved::cached(hit, Strategy::StaleWhileRevalidate);
        }

        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.write_back(role, key, response.clone()).await;
                }
                Resolved::network(response, Strategy::StaleWhileRevalidate)
            }
            Err(e) => {
                tracing::debug!(key = %key, "stale-while-revalidate miss while offline: {e}");
                if request.navigate {
                    return self.offline_document(Strategy::StaleWhileRevalidate).await;
                }
                Resolved::synthetic(503, OFFLINE_BODY, Some(Strategy::StaleWhileRevalidate))
            }
        }
    }

    pub(crate) async fn cache_only(&self, key: String) -> Resolved {
        match self.match_any(&key).await {
            Some(hit) => Resolved::cached(hit, Strategy::CacheOnly),
            None => Resolved::synthetic(404, NOT_IN_CACHE_BODY, Some(Strategy::CacheOnly)),
        }
    }

    pub(crate) async fn passthrough(&self, request: &InterceptedRequest, reason: BypassReason) -> Resolved {
        tracing::trace!(url = %request.url, ?reason, "bypassing engine");
        match self.fetch_network(request).await {
            Ok(response) => Resolved { response, source: ResponseSource::Bypass, strategy: None },
            Err(e) => {
                tracing::debug!(url = %request.url, "bypassed request failed: {e}");
                Resolved::synthetic(503, OFFLINE_BODY, None)
            }
        }
    }

    /// The cached offline document, or a synthetic 503 when it is missing.
    async fn offline_document(&self, strategy: Strategy) -> Resolved {
        let Ok(key) = self.offline_document_key() else {
            return Resolved::synthetic(503, OFFLINE_BODY, Some(strategy));
        };

        let hit = match self.lookup(Role::Offline, &key).await {
            Some(hit) => Some(hit),
            None => self.match_any(&key).await,
        };
        match hit {
            Some(doc) => Resolved::cached(doc, strategy),
            None => Resolved::synthetic(503, OFFLINE_BODY, Some(strategy)),
        }
    }

    fn revalidate_in_background(&self, request: InterceptedRequest, role: Role, key: String) {
        let engine = self.clone();
        self.spawn_background(async move {
            match engine.fetch_network(&request).await {
                Ok(response) if response.is_ok() => engine.store_response(role, &key, &response).await,
                Ok(response) => {
                    tracing::debug!(key = %key, status = response.status, "revalidation kept cached copy");
                }
                Err(e) => tracing::warn!(key = %key, "revalidation failed: {e}"),
            }
        });
    }

    /// Lookup in the current partition of `role`; store errors read as misses.
    pub(crate) async fn lookup(&self, role: Role, key: &str) -> Option<CachedResponse> {
        let name = self.partition_name(role);
        let result = match self.store().open_partition(&name).await {
            Ok(partition) => partition.lookup(key).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(partition = %name, key = %key, "cache read failed: {e}");
            None
        })
    }

    /// Role partition first, then every other partition. Precached and
    /// preloaded entries live outside the role partition of their strategy.
    async fn lookup_or_any(&self, role: Role, key: &str) -> Option<CachedResponse> {
        match self.lookup(role, key).await {
            Some(hit) => Some(hit),
            None => self.match_any(key).await,
        }
    }

    /// Lookup across every partition; store errors read as misses.
    pub(crate) async fn match_any(&self, key: &str) -> Option<CachedResponse> {
        self.store().match_any(key).await.unwrap_or_else(|e| {
            tracing::warn!(key = %key, "cache read failed: {e}");
            None
        })
    }

    /// Write a response back on a task of its own and wait for it.
    ///
    /// Dropping the caller's future does not cancel the spawned write.
    pub(crate) async fn write_back(&self, role: Role, key: String, response: CachedResponse) {
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.store_response(role, &key, &response).await });
        if let Err(e) = handle.await {
            tracing::warn!("write-back task failed: {e}");
        }
    }

    /// Store a response into the current partition of `role`.
    pub(crate) async fn store_response(&self, role: Role, key: &str, response: &CachedResponse) {
        let name = self.partition_name(role);
        let result = async {
            let partition = self.store().open_partition(&name).await?;
            let previous = partition.body_digest(key).await?;
            partition.put(key, response).await?;
            Ok::<_, crate::Error>((partition, previous))
        }
        .await;

        match result {
            Ok((partition, previous)) => {
                let changed = previous.is_none_or(|d| d != body_digest(&response.body));
                tracing::debug!(partition = %name, key = %key, changed, "wrote back response");
                if role == Role::Images {
                    self.evict_after_image_write(&partition).await;
                }
            }
            Err(e) => tracing::warn!(partition = %name, key = %key, "write-back failed: {e}"),
        }
    }
}
