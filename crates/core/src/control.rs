//! Out-of-band control messages.
//!
//! Messages are tagged JSON records, e.g. `{"type": "GET_CACHE_SIZE"}`. None of
//! them take a lock against in-flight requests: a purge racing a read is
//! benign because the reader already owns its response copy.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::Error;
use crate::cache::{Partition, Role};
use crate::engine::CacheEngine;
use crate::lifecycle::LifecycleState;
use crate::network::InterceptedRequest;

static MARKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Payload of `PRELOAD_MARKET_RESOURCES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MarketPayload {
    /// Market slug, `[a-z0-9-]+`.
    pub market: String,
}

/// A control message from the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Fetch each resource and store successes in the dynamic partition.
    PreloadResources { resources: Vec<String> },
    /// Preload the configured resource templates of one market.
    PreloadMarketResources { payload: MarketPayload },
    /// Activate the installed version without waiting for existing clients.
    SkipWaiting,
    /// Delete every partition.
    ClearCache,
    /// Delete every partition.
    ClearAll,
    /// Total declared size of every entry.
    GetCacheSize,
}

impl ControlMessage {
    /// Decode a message from a JSON value.
    ///
    /// # Errors
    ///
    /// `Error::InvalidMessage` for an unknown type or malformed payload.
    pub fn parse(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    /// Decode a message from JSON text.
    ///
    /// # Errors
    ///
    /// `Error::InvalidMessage` for invalid JSON, an unknown type, or a
    /// malformed payload.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Result of a preload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PreloadReport {
    pub requested: usize,
    pub cached: usize,
    /// Resources that could not be fetched or stored, in request order.
    pub failed: Vec<String>,
}

/// Reply to a control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum ControlReply {
    Preload(PreloadReport),
    CacheSize {
        #[serde(rename = "cacheSize")]
        cache_size: u64,
    },
    Cleared {
        cleared: Vec<String>,
    },
    Lifecycle {
        state: LifecycleState,
    },
}

impl CacheEngine {
    /// Execute one control message.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for a malformed market slug, or a store error
    /// when partitions cannot be enumerated.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<ControlReply, Error> {
        tracing::debug!(?message, "control message");
        match message {
            ControlMessage::PreloadResources { resources } => Ok(ControlReply::Preload(self.preload(resources).await?)),
            ControlMessage::PreloadMarketResources { payload } => {
                Ok(ControlReply::Preload(self.preload_market(&payload.market).await?))
            }
            ControlMessage::SkipWaiting => Ok(ControlReply::Lifecycle { state: self.skip_waiting().await? }),
            ControlMessage::ClearCache | ControlMessage::ClearAll => {
                Ok(ControlReply::Cleared { cleared: self.clear_all().await? })
            }
            ControlMessage::GetCacheSize => Ok(ControlReply::CacheSize { cache_size: self.cache_size().await? }),
        }
    }

    /// Fetch every resource independently and store the 2xx responses in the
    /// dynamic partition. Individual failures are logged and reported; the
    /// batch itself never fails on them.
    ///
    /// # Errors
    ///
    /// Returns a store error only when the dynamic partition cannot be opened.
    pub async fn preload(&self, resources: Vec<String>) -> Result<PreloadReport, Error> {
        let requested = resources.len();
        if requested == 0 {
            return Ok(PreloadReport::default());
        }
        let partition = self.store().open_partition(&self.partition_name(Role::Dynamic)).await?;
        let semaphore = Arc::new(Semaphore::new(self.config().preload_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (index, resource) in resources.iter().cloned().enumerate() {
            let engine = self.clone();
            let partition = partition.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = engine.preload_one(&partition, &resource).await;
                (index, resource, result)
            });
        }

        let mut cached = 0;
        let mut settled = vec![false; requested];
        let mut failed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(()))) => {
                    settled[index] = true;
                    cached += 1;
                }
                Ok((index, resource, Err(e))) => {
                    tracing::warn!(resource = %resource, "preload failed: {e}");
                    settled[index] = true;
                    failed.push(index);
                }
                Err(e) => tracing::warn!("preload task failed: {e}"),
            }
        }
        // A task that panicked or was cancelled never reported back.
        failed.extend(settled.iter().enumerate().filter(|(_, done)| !**done).map(|(index, _)| index));
        failed.sort_unstable();

        tracing::info!(requested, cached, failed = failed.len(), "preload finished");
        let failed = failed.into_iter().map(|index| resources[index].clone()).collect();
        Ok(PreloadReport { requested, cached, failed })
    }

    async fn preload_one(&self, partition: &Partition, resource: &str) -> Result<(), Error> {
        let request = InterceptedRequest::get(self.resolve_url(resource)?);
        let response = self.fetch_network(&request).await?;
        if !response.is_ok() {
            return Err(Error::Network(format!("HTTP {}", response.status)));
        }
        partition.put(&self.request_key(&request), &response).await
    }

    /// Preload the configured resource templates of one market.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` when the slug is not `[a-z0-9-]+`.
    pub async fn preload_market(&self, market: &str) -> Result<PreloadReport, Error> {
        if !MARKET_RE.is_match(market) {
            return Err(Error::InvalidInput(format!("invalid market slug: {market:?}")));
        }
        let resources =
            self.config().market_resources.iter().map(|t| t.replace("{market}", market)).collect();
        self.preload(resources).await
    }

    /// Delete every partition, whatever its version. Returns the deleted names.
    ///
    /// # Errors
    ///
    /// Returns a store error when partitions cannot be enumerated; failures
    /// deleting a single partition are logged and skipped.
    pub async fn clear_all(&self) -> Result<Vec<String>, Error> {
        let mut cleared = Vec::new();
        for name in self.store().partition_names().await? {
            match self.store().delete_partition(&name).await {
                Ok(true) => cleared.push(name),
                Ok(false) => {}
                Err(e) => tracing::warn!(partition = %name, "failed to delete partition: {e}"),
            }
        }
        tracing::info!(partitions = cleared.len(), "cleared cache");
        Ok(cleared)
    }

    /// Total declared size in bytes across every partition.
    ///
    /// # Errors
    ///
    /// Returns a store error when entries cannot be read.
    pub async fn cache_size(&self) -> Result<u64, Error> {
        self.store().total_declared_size().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::cache::CachedResponse;
    use crate::engine::EngineConfig;
    use crate::testing::{ScriptedNetwork, active_engine, active_engine_with, test_config};

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            ControlMessage::parse(json!({"type": "PRELOAD_RESOURCES", "resources": ["/a", "/b"]})).unwrap(),
            ControlMessage::PreloadResources { resources: vec!["/a".into(), "/b".into()] }
        );
        assert_eq!(
            ControlMessage::parse(json!({"type": "PRELOAD_MARKET_RESOURCES", "payload": {"market": "eu-west"}}))
                .unwrap(),
            ControlMessage::PreloadMarketResources { payload: MarketPayload { market: "eu-west".into() } }
        );
        assert_eq!(ControlMessage::from_json(r#"{"type":"SKIP_WAITING"}"#).unwrap(), ControlMessage::SkipWaiting);
        assert_eq!(ControlMessage::from_json(r#"{"type":"CLEAR_CACHE"}"#).unwrap(), ControlMessage::ClearCache);
        assert_eq!(ControlMessage::from_json(r#"{"type":"GET_CACHE_SIZE"}"#).unwrap(), ControlMessage::GetCacheSize);
    }

    #[test]
    fn test_invalid_messages_are_loud() {
        for bad in [
            json!({"type": "REBOOT"}),
            json!({"type": "PRELOAD_RESOURCES"}),
            json!({"type": "PRELOAD_MARKET_RESOURCES", "payload": {}}),
            json!({"resources": []}),
        ] {
            assert!(matches!(ControlMessage::parse(bad), Err(Error::InvalidMessage(_))));
        }
        assert!(matches!(ControlMessage::from_json("not json"), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_reply_shapes() {
        let size = serde_json::to_value(ControlReply::CacheSize { cache_size: 3072 }).unwrap();
        assert_eq!(size, json!({"cacheSize": 3072}));

        let state = serde_json::to_value(ControlReply::Lifecycle { state: LifecycleState::Active }).unwrap();
        assert_eq!(state, json!({"state": "ACTIVE"}));
    }

    #[tokio::test]
    async fn test_get_cache_size_scenario() {
        let engine = active_engine(Arc::new(ScriptedNetwork::new())).await;
        let images = engine.store().open_partition("images").await.unwrap();
        let dynamic = engine.store().open_partition("dynamic").await.unwrap();
        images
            .put("GET https://app.example.com/a.png", &CachedResponse::new(200, "x").with_header("content-length", "1024"))
            .await
            .unwrap();
        dynamic
            .put("GET https://app.example.com/api/b", &CachedResponse::new(200, "y").with_header("content-length", "2048"))
            .await
            .unwrap();

        let reply = engine.handle_message(ControlMessage::GetCacheSize).await.unwrap();
        assert_eq!(reply, ControlReply::CacheSize { cache_size: 3072 });
    }

    #[tokio::test]
    async fn test_clear_all_scenario() {
        let engine = active_engine(Arc::new(ScriptedNetwork::new())).await;
        let key = "GET https://app.example.com/static/app.js";
        for name in ["static-pwa-v1.0.0", "dynamic-pwa-v1.0.0", "images-pwa-v1.0.0", "offline-pwa-v1.0.0", "legacy"] {
            let partition = engine.store().open_partition(name).await.unwrap();
            partition.put(key, &CachedResponse::new(200, name)).await.unwrap();
        }

        let reply = engine.handle_message(ControlMessage::ClearAll).await.unwrap();
        let ControlReply::Cleared { cleared } = reply else {
            panic!("unexpected reply: {reply:?}");
        };
        assert_eq!(cleared.len(), 5);
        assert!(engine.store().partition_names().await.unwrap().is_empty());
        assert!(engine.store().match_any(key).await.unwrap().is_none());

        let again = engine.handle_message(ControlMessage::ClearCache).await.unwrap();
        assert_eq!(again, ControlReply::Cleared { cleared: Vec::new() });
    }

    #[tokio::test]
    async fn test_preload_settles_all() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/one", 200, "1");
        network.fail("/api/two");
        network.respond("/api/three", 500, "boom");
        network.respond("/api/four", 200, "4");
        let engine = active_engine(network).await;

        let report = engine
            .preload(vec!["/api/one".into(), "/api/two".into(), "/api/three".into(), "/api/four".into()])
            .await
            .unwrap();
        assert_eq!(report.requested, 4);
        assert_eq!(report.cached, 2);
        assert_eq!(report.failed, vec!["/api/two", "/api/three"]);

        let dynamic = engine.store().open_partition(&engine.partition_name(Role::Dynamic)).await.unwrap();
        assert_eq!(dynamic.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_preload_reports_panicked_fetch_as_failed() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/one", 200, "1");
        network.panic_on("/api/broken");
        let engine = active_engine(network).await;

        let report = engine.preload(vec!["/api/broken".into(), "/api/one".into()]).await.unwrap();
        assert_eq!(report.requested, 2);
        assert_eq!(report.cached, 1);
        assert_eq!(report.failed, vec!["/api/broken"]);
    }

    #[tokio::test]
    async fn test_preloaded_asset_served_offline() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/static/js/chunk.js", 200, "chunk");
        let engine = active_engine(network.clone()).await;

        let report = engine.preload(vec!["/static/js/chunk.js".into()]).await.unwrap();
        assert_eq!(report.cached, 1);

        network.fail("/static/js/chunk.js");
        let url = engine.resolve_url("/static/js/chunk.js").unwrap();
        let resolved = engine.intercept(InterceptedRequest::get(url)).await;
        assert_eq!(resolved.response.status, 200);
        assert_eq!(resolved.response.text(), "chunk");
        assert_eq!(resolved.source, crate::ResponseSource::Cache);
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_preload_market() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/markets/btc-usd", 200, "<html>btc</html>");
        network.respond("/api/markets/btc-usd.json", 200, "{}");
        let config = EngineConfig { preload_concurrency: 1, ..test_config() };
        let engine = active_engine_with(network.clone(), config).await;

        let message = ControlMessage::parse(json!({"type": "PRELOAD_MARKET_RESOURCES", "payload": {"market": "btc-usd"}}))
            .unwrap();
        let reply = engine.handle_message(message).await.unwrap();
        assert_eq!(reply, ControlReply::Preload(PreloadReport { requested: 2, cached: 2, failed: Vec::new() }));
        assert_eq!(network.calls(), 2);
    }

    #[tokio::test]
    async fn test_preload_market_rejects_bad_slug() {
        let network = Arc::new(ScriptedNetwork::new());
        let engine = active_engine(network.clone()).await;

        for slug in ["", "BTC", "../etc", "a b"] {
            assert!(matches!(engine.preload_market(slug).await, Err(Error::InvalidInput(_))));
        }
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let engine = active_engine(Arc::new(ScriptedNetwork::new())).await;
        let reply = engine.handle_message(ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(reply, ControlReply::Lifecycle { state: LifecycleState::Active });
    }
}
