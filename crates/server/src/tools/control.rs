//! control tool implementation.
//!
//! Accepts a raw control message (`{"type": "GET_CACHE_SIZE"}` and friends)
//! and returns the engine's reply.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::{CacheEngine, ControlMessage, Error, Event, EventOutcome};

use super::json_result;

/// Input parameters for the control tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlParams {
    /// Tagged control message, e.g. `{"type": "PRELOAD_RESOURCES", "resources": ["/a"]}`.
    pub message: serde_json::Value,
}

/// Implementation of the control tool.
pub async fn control_impl(engine: &CacheEngine, params: ControlParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::parse(params.message)?;
    let EventOutcome::Reply(reply) = engine.dispatch(Event::Message(message)).await? else {
        return Err(Error::UnhandledEvent("message handler returned no reply".into()).into());
    };
    json_result(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{engine_for, output};
    use serde_json::json;
    use tidecache_core::CachedResponse;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cache_size() {
        let server = MockServer::start().await;
        let engine = engine_for(&server).await;
        let images = engine.store().open_partition("images").await.unwrap();
        images
            .put("GET /a.png", &CachedResponse::new(200, "x").with_header("content-length", "1024"))
            .await
            .unwrap();

        let params = ControlParams { message: json!({"type": "GET_CACHE_SIZE"}) };
        let out = output(&control_impl(&engine, params).await.unwrap());
        assert_eq!(out, json!({"cacheSize": 1024}));
    }

    #[tokio::test]
    async fn test_preload_and_clear() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/markets/eu.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;
        let engine = engine_for(&server).await;

        let params = ControlParams { message: json!({"type": "PRELOAD_MARKET_RESOURCES", "payload": {"market": "eu"}}) };
        let out = output(&control_impl(&engine, params).await.unwrap());
        assert_eq!(out["requested"], 2);
        assert_eq!(out["cached"], 1);
        assert_eq!(out["failed"], json!(["/markets/eu"]));

        let params = ControlParams { message: json!({"type": "CLEAR_ALL"}) };
        let out = output(&control_impl(&engine, params).await.unwrap());
        assert_eq!(out["cleared"], json!(["dynamic-pwa-v1.0.0"]));
    }

    #[tokio::test]
    async fn test_unknown_message_is_invalid_params() {
        let server = MockServer::start().await;
        let engine = engine_for(&server).await;

        let params = ControlParams { message: json!({"type": "REBOOT"}) };
        let err = control_impl(&engine, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
