//! MCP tool implementations.
//!
//! Each tool drives the engine through its dispatch table and returns its
//! output as pretty-printed JSON text content.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use tidecache_core::Error;

pub mod connectivity;
pub mod control;
pub mod intercept;
pub mod lifecycle;
pub mod partitions;

pub use connectivity::{ConnectivityParams, connectivity_impl};
pub use control::{ControlParams, control_impl};
pub use intercept::{InterceptParams, intercept_impl};
pub use lifecycle::{activate_impl, install_impl};
pub use partitions::{PartitionsParams, partitions_impl};

/// Serialize a tool output as JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rmcp::model::CallToolResult;
    use tidecache_client::{FetchConfig, HttpNetwork};
    use tidecache_core::{AppConfig, CacheEngine, EngineConfig, PartitionStore};
    use wiremock::MockServer;

    /// Engine whose origin is the mock server, with nothing precached.
    pub(crate) async fn engine_for(server: &MockServer) -> CacheEngine {
        engine_with(AppConfig { origin: server.uri(), ..AppConfig::default() }).await
    }

    /// Engine at `app.origin`, with no static resources precached.
    pub(crate) async fn engine_with(app: AppConfig) -> CacheEngine {
        let app = AppConfig { precache_static: Vec::new(), ..app };
        let store = PartitionStore::open_in_memory().await.unwrap();
        let network = HttpNetwork::new(FetchConfig::from(&app)).unwrap();
        CacheEngine::new(store, Arc::new(network), EngineConfig::from_app(&app).unwrap())
    }

    /// Origin on a local port with nothing listening.
    pub(crate) fn refused_origin() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        format!("http://127.0.0.1:{port}")
    }

    /// Decode the JSON text content of a tool result.
    pub(crate) fn output(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
