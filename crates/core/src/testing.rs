//! Test doubles shared by the core unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use url::Url;

use crate::Error;
use crate::http::{Network, Request, Response};

pub const ORIGIN: &str = "https://app.test";

/// Absolute URL for a path on the test origin.
pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Scripted network keyed by path (query included when present).
///
/// Unscripted paths answer 404. While offline every fetch fails with
/// `Error::Network`.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, response: Response) -> Self {
        self.set_route(path, response);
        self
    }

    pub fn offline(self) -> Self {
        self.set_online(false);
        self
    }

    pub fn set_route(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths fetched so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.requested.lock().unwrap().push(path.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: connection refused", request.url)));
        }

        let routes = self.routes.lock().unwrap();
        let scripted = request.url.query().and_then(|q| routes.get(&format!("{path}?{q}"))).or_else(|| routes.get(&path));
        let mut response = match scripted {
            Some(response) => response.clone(),
            None => Response::ok("", "not found").with_status(404, "Not Found"),
        };
        if response.url.is_empty() {
            response.url = request.url.to_string();
        }
        Ok(response)
    }
}
