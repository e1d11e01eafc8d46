//! notes_add tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::Host;
use crate::tools::json_result;

/// Parameters for the notes_add tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotesAddParams {
    /// Note text.
    pub text: String,
}

/// Implementation of the notes_add tool.
///
/// Online the note is synced right away; offline it is queued under the
/// `sync-notes` tag until connectivity returns.
pub async fn add_impl(host: &Host, params: NotesAddParams) -> Result<CallToolResult, McpError> {
    let saved = host.add_note(&params.text).await?;
    json_result(&saved)
}
