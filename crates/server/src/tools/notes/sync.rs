//! notes_sync tool implementation.
//!
//! Runs one sync pass now instead of waiting for connectivity to return.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::host::Host;
use crate::tools::json_result;

pub async fn sync_impl(host: &Host) -> Result<CallToolResult, McpError> {
    let outcome = host.sync_notes().await?;
    json_result(&outcome)
}
