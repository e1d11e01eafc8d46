//! cache_status tool implementation.
//!
//! Reports the runtime mode, lifecycle state, buckets and record usage.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::host::Host;
use crate::tools::json_result;

pub async fn status_impl(host: &Host) -> Result<CallToolResult, McpError> {
    let status = host.status().await?;
    json_result(&status)
}
