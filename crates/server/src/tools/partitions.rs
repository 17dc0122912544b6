//! partitions tool implementation.
//!
//! Reports the lifecycle state and every partition in the store, optionally
//! after running an image eviction pass.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::eviction::EvictionReport;
use tidecache_core::{CacheEngine, LifecycleState};

use super::json_result;

/// Input parameters for the partitions tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PartitionsParams {
    /// Enforce the image budget before reporting (default: false).
    #[serde(default)]
    pub evict: bool,
}

/// One partition in the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionSummary {
    pub name: String,
    /// Whether the name belongs to the current version.
    pub current: bool,
    pub entries: usize,
    /// Sum of declared content-length.
    pub bytes: u64,
}

/// Output of the partitions tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PartitionsOutput {
    pub version: String,
    pub state: LifecycleState,
    pub online: bool,
    pub partitions: Vec<PartitionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction: Option<EvictionReport>,
}

/// Implementation of the partitions tool.
pub async fn partitions_impl(engine: &CacheEngine, params: PartitionsParams) -> Result<CallToolResult, McpError> {
    let eviction = if params.evict { Some(engine.evict_images().await?) } else { None };

    let current = engine.config().partitions.current_names();
    let mut partitions = Vec::new();
    for name in engine.store().partition_names().await? {
        let meta = engine.store().open_partition(&name).await?.entry_meta().await?;
        partitions.push(PartitionSummary {
            current: current.contains(&name),
            entries: meta.len(),
            bytes: meta.iter().map(|m| m.declared_size).sum(),
            name,
        });
    }

    json_result(&PartitionsOutput {
        version: engine.config().partitions.version().to_string(),
        state: engine.lifecycle_state(),
        online: engine.is_online(),
        partitions,
        eviction,
    })
}
