//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offline-h5 server.

pub mod cache_status;
pub mod network_status;
pub mod notes;
pub mod page_fetch;

pub use cache_status::status_impl;
pub use network_status::{NetworkStatusParams, network_impl};
pub use notes::{NotesAddParams, NotesListParams, add_impl, list_impl, sync_impl};
pub use page_fetch::{PageFetchParams, fetch_impl};

use rmcp::{ErrorData as McpError, model::*};
use serde::Serialize;

use crate::error::ServerError;

/// Pretty JSON text result.
pub(crate) fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
