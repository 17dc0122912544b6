//! install and activate tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;
use tidecache_core::lifecycle::{ActivationReport, InstallReport};
use tidecache_core::{CacheEngine, Error, Event, EventOutcome, LifecycleState};

use super::json_result;

/// Output of the install tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct InstallOutput {
    pub state: LifecycleState,
    pub report: InstallReport,
}

/// Output of the activate tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ActivateOutput {
    pub state: LifecycleState,
    pub report: ActivationReport,
}

/// Implementation of the install tool.
///
/// A failed install leaves the engine installing; calling the tool again
/// retries the whole step.
pub async fn install_impl(engine: &CacheEngine) -> Result<CallToolResult, McpError> {
    let EventOutcome::Installed(report) = engine.dispatch(Event::Install).await? else {
        return Err(Error::UnhandledEvent("install handler returned no report".into()).into());
    };
    json_result(&InstallOutput { state: engine.lifecycle_state(), report })
}

/// Implementation of the activate tool.
pub async fn activate_impl(engine: &CacheEngine) -> Result<CallToolResult, McpError> {
    let EventOutcome::Activated(report) = engine.dispatch(Event::Activate).await? else {
        return Err(Error::UnhandledEvent("activate handler returned no report".into()).into());
    };
    json_result(&ActivateOutput { state: engine.lifecycle_state(), report })
}
