//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the page host.
use std::sync::Arc;

use crate::host::Host;
use crate::tools::{
    NetworkStatusParams, NotesAddParams, NotesListParams, PageFetchParams, add_impl, fetch_impl, list_impl,
    network_impl, status_impl, sync_impl,
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

/// The main MCP server handler for offline-h5.
#[derive(Clone)]
pub struct OfflineH5Server {
    host: Arc<Host>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OfflineH5Server {
    /// Create a new server handler around a started host.
    pub fn new(host: Arc<Host>) -> Self {
        Self { host, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Send a page request through the offline runtime. Returns status, body and whether it came from network, cache, the offline page or passthrough."
    )]
    async fn page_fetch(&self, params: Parameters<PageFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.host, params.0).await
    }

    #[tool(description = "Save a note. Synced immediately when online, queued for background sync when offline.")]
    async fn notes_add(&self, params: Parameters<NotesAddParams>) -> Result<CallToolResult, McpError> {
        add_impl(&self.host, params.0).await
    }

    #[tool(description = "List saved notes, optionally filtered by their synced flag.")]
    async fn notes_list(&self, params: Parameters<NotesListParams>) -> Result<CallToolResult, McpError> {
        list_impl(&self.host, params.0).await
    }

    #[tool(description = "Push unsynced notes to the remote now.")]
    async fn notes_sync(&self) -> Result<CallToolResult, McpError> {
        sync_impl(&self.host).await
    }

    #[tool(description = "Report that the page went online or offline.")]
    async fn network_status(&self, params: Parameters<NetworkStatusParams>) -> Result<CallToolResult, McpError> {
        network_impl(&self.host, params.0).await
    }

    #[tool(description = "Show runtime mode, worker lifecycle state, cache buckets, record usage and pending syncs.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.host).await
    }
}

impl ServerHandler for OfflineH5Server {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offline-h5".into(),
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
