//! network_status tool implementation.
//!
//! Tells the page it went online or offline. The worker fires queued
//! background syncs on reconnect; the fallback controller redirects, probes,
//! precaches and syncs.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::Host;
use crate::tools::json_result;

/// Parameters for the network_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NetworkStatusParams {
    /// New connectivity state.
    pub online: bool,
}

pub async fn network_impl(host: &Host, params: NetworkStatusParams) -> Result<CallToolResult, McpError> {
    let change = host.set_online(params.online).await;
    json_result(&change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, output_json, test_config};
    use offline_h5_core::LocalDb;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_state_is_not_a_change() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let host = Host::with_db(test_config(true), db, Arc::new(ScriptedNetwork::site())).unwrap();

        let output = output_json(&network_impl(&host, NetworkStatusParams { online: true }).await.unwrap());
        assert_eq!(output["changed"], false);
        assert!(output["transition"].is_null());
    }

    #[tokio::test]
    async fn test_fallback_offline_transition() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let host = Host::with_db(test_config(false), db, Arc::new(ScriptedNetwork::site())).unwrap();

        let output = output_json(&network_impl(&host, NetworkStatusParams { online: false }).await.unwrap());
        assert_eq!(output["changed"], true);
        assert_eq!(output["transition"]["quality"], "poor");
        assert_eq!(output["transition"]["navigated"], true);
    }
}
