//! notes_list tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offline_h5_core::Note;

use crate::host::Host;
use crate::tools::json_result;

/// Parameters for the notes_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NotesListParams {
    /// Only notes with this sync flag. All notes when omitted.
    #[serde(default)]
    pub synced: Option<bool>,
}

/// Output from the notes_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotesListOutput {
    pub count: usize,
    /// Newest first.
    pub notes: Vec<Note>,
}

/// Implementation of the notes_list tool.
pub async fn list_impl(host: &Host, params: NotesListParams) -> Result<CallToolResult, McpError> {
    let notes = host.list_notes(params.synced).await?;
    json_result(&NotesListOutput { count: notes.len(), notes })
}
