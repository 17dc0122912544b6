//! connectivity tool implementation.
//!
//! Hosts report online/offline transitions here. Listeners are notified;
//! nothing is replayed on reconnect.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::{CacheEngine, ConnectivityEvent, Error, Event, EventOutcome};

use super::json_result;

/// Input parameters for the connectivity tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityParams {
    /// New connectivity state: "online" or "offline".
    pub status: ConnectivityEvent,
}

/// Output of the connectivity tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityOutput {
    pub online: bool,
    /// Listeners notified of the change.
    pub listeners: usize,
}

/// Implementation of the connectivity tool.
pub async fn connectivity_impl(engine: &CacheEngine, params: ConnectivityParams) -> Result<CallToolResult, McpError> {
    let EventOutcome::Notified { listeners } = engine.dispatch(Event::Connectivity(params.status)).await? else {
        return Err(Error::UnhandledEvent("connectivity handler returned no notification".into()).into());
    };
    json_result(&ConnectivityOutput { online: engine.is_online(), listeners })
}
