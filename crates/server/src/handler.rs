//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the engine.
use crate::tools::{
    ConnectivityParams, ControlParams, InterceptParams, PartitionsParams, activate_impl, connectivity_impl,
    control_impl, install_impl, intercept_impl, partitions_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tidecache_core::CacheEngine;

/// The main MCP server handler for tidecache.
#[derive(Clone)]
pub struct TideCacheServer {
    engine: CacheEngine,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TideCacheServer {
    /// Create a new server handler around an engine.
    pub fn new(engine: CacheEngine) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Route a request through the cache engine. Returns the response with its source (network, cache, synthetic, bypass) and the strategy applied."
    )]
    async fn intercept(&self, params: Parameters<InterceptParams>) -> Result<CallToolResult, McpError> {
        intercept_impl(&self.engine, params.0).await
    }

    #[tool(description = "Run the install step: bulk-add the critical static and offline resources, all-or-nothing.")]
    async fn install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.engine).await
    }

    #[tool(description = "Activate the installed version and delete partitions of every other version.")]
    async fn activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.engine).await
    }

    #[tool(
        description = "Send a control message: PRELOAD_RESOURCES, PRELOAD_MARKET_RESOURCES, SKIP_WAITING, CLEAR_CACHE, CLEAR_ALL, or GET_CACHE_SIZE."
    )]
    async fn control(&self, params: Parameters<ControlParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.engine, params.0).await
    }

    #[tool(description = "Report a connectivity change (online/offline) and notify listeners.")]
    async fn connectivity(&self, params: Parameters<ConnectivityParams>) -> Result<CallToolResult, McpError> {
        connectivity_impl(&self.engine, params.0).await
    }

    #[tool(description = "List cache partitions with entry counts and declared sizes, optionally after an eviction pass.")]
    async fn partitions(&self, params: Parameters<PartitionsParams>) -> Result<CallToolResult, McpError> {
        partitions_impl(&self.engine, params.0).await
    }
}

impl ServerHandler for TideCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tidecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
