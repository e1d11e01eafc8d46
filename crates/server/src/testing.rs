//! Test helpers: a scripted site and a small config around it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use offline_h5_core::http::{Network, Request, Response};
use offline_h5_core::{AppConfig, Error};

pub const ORIGIN: &str = "https://app.test";

/// Answers from a fixed path → response table; anything else is a 404.
pub struct ScriptedNetwork {
    routes: BTreeMap<String, Response>,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    /// The page shell, its offline document, a script, one extra page and a
    /// video.
    pub fn site() -> Self {
        let mut routes = BTreeMap::new();
        for (path, body, content_type) in [
            ("/", "<h1>home</h1>", "text/html"),
            ("/offline.html", "<h1>offline</h1>", "text/html"),
            ("/js/app.js", "console.log(1)", "application/javascript"),
            ("/about.html", "<h1>about</h1>", "text/html"),
            ("/video/intro.mp4", "mp4-bytes", "video/mp4"),
        ] {
            routes.insert(
                path.to_string(),
                Response::ok(format!("{ORIGIN}{path}"), body).with_header("content-type", content_type),
            );
        }
        Self { routes, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.routes.get(request.url.path()) {
            Some(response) => Ok(response.clone()),
            None => Ok(Response::ok(request.url.to_string(), "missing").with_status(404, "Not Found")),
        }
    }
}

/// Config for the scripted site with a three-entry manifest.
pub fn test_config(worker_supported: bool) -> AppConfig {
    AppConfig {
        origin: ORIGIN.to_string(),
        cache_version: "9.9.9".to_string(),
        manifest: vec!["/".into(), "/offline.html".into(), "/js/app.js".into()],
        worker_supported,
        ..Default::default()
    }
}

/// Parse the JSON text of a tool result.
pub fn output_json(result: &rmcp::model::CallToolResult) -> serde_json::Value {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
