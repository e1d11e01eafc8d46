//! page_fetch tool implementation.
//!
//! Sends a page request through the active runtime and reports where the
//! response came from.

use chrono::Utc;
use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offline_h5_core::Source;
use offline_h5_core::http::Method;

use crate::error::ServerError;
use crate::host::{Host, PageRequest};
use crate::tools::json_result;

/// Input parameters for page_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageFetchParams {
    /// Absolute URL, or a path on the page origin (e.g. "/video/1.mp4").
    pub url: String,

    /// HTTP method (default: "GET"). Only GET requests are cached.
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level navigation (Accept: text/html).
    #[serde(default)]
    pub navigate: bool,

    /// Optional Accept header override.
    #[serde(default)]
    pub accept: Option<String>,

    /// Maximum body bytes returned in the output (default: 64KB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_method() -> String {
    "GET".into()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Output structure for page_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageFetchOutput {
    /// The URL requested, resolved against the origin.
    pub url: String,
    /// The URL of the response (after redirects, or the cached entry's URL).
    pub final_url: String,
    pub status: u16,
    pub status_text: String,
    /// network, cache, offline-page or passthrough.
    pub source: Source,
    /// basic, cors or opaque.
    pub kind: String,
    pub content_type: Option<String>,
    /// ISO8601 timestamp of when the response was served.
    pub fetched_at: String,
    /// Full body size in bytes.
    pub bytes: usize,
    /// Body as text, cut at `max_body_bytes`.
    pub body: String,
    pub truncated: bool,
}

/// Implementation of the page_fetch tool.
pub async fn fetch_impl(host: &Host, params: PageFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ServerError::InvalidInput("url cannot be empty".into()).into());
    }
    let method: Method = params.method.parse()?;

    let served = host
        .fetch(PageRequest { target: params.url.clone(), method, navigate: params.navigate, accept: params.accept })
        .await?;
    let fetched_at = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let response = served.response;
    let bytes = response.body.len();
    let truncated = bytes > params.max_body_bytes;
    let shown = &response.body[..bytes.min(params.max_body_bytes)];

    let output = PageFetchOutput {
        url: params.url,
        final_url: response.url.clone(),
        status: response.status,
        status_text: response.status_text.clone(),
        source: served.source,
        kind: response.kind.as_str().to_string(),
        content_type: response.header("content-type").map(str::to_string),
        fetched_at,
        bytes,
        body: String::from_utf8_lossy(shown).to_string(),
        truncated,
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, output_json, test_config};
    use offline_h5_core::LocalDb;
    use std::sync::Arc;

    fn params(url: &str) -> PageFetchParams {
        PageFetchParams {
            url: url.to_string(),
            method: default_method(),
            navigate: false,
            accept: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }

    async fn started_host() -> Host {
        let db = LocalDb::open_in_memory().await.unwrap();
        let host = Host::with_db(test_config(true), db, Arc::new(ScriptedNetwork::site())).unwrap();
        host.start().await.unwrap();
        host
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        let host = started_host().await;
        let result = fetch_impl(&host, params(" ")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_unknown_method() {
        let host = started_host().await;
        let result = fetch_impl(&host, PageFetchParams { method: "BREW".into(), ..params("/") }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_cached_script() {
        let host = started_host().await;
        let result = fetch_impl(&host, params("/js/app.js")).await.unwrap();
        let output = output_json(&result);

        assert_eq!(output["source"], "cache");
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"], "console.log(1)");
        assert_eq!(output["content_type"], "application/javascript");
        assert_eq!(output["truncated"], false);
    }

    #[tokio::test]
    async fn test_fetch_truncates_body() {
        let host = started_host().await;
        let result = fetch_impl(&host, PageFetchParams { max_body_bytes: 4, ..params("/about.html") })
            .await
            .unwrap();
        let output = output_json(&result);

        assert_eq!(output["source"], "network");
        assert_eq!(output["body"], "<h1>");
        assert_eq!(output["bytes"], 14);
        assert_eq!(output["truncated"], true);
    }

    #[tokio::test]
    async fn test_fetch_missing_page_is_a_response() {
        let host = started_host().await;
        let result = fetch_impl(&host, params("/nope.html")).await.unwrap();
        let output = output_json(&result);
        assert_eq!(output["status"], 404);
    }
}
