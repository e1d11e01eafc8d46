//! Cache-first and network-first request strategies.
//!
//! Both are written once against [`ResourceCache`] and [`Network`]; the worker
//! runs them over its versioned bucket and the fallback controller over its
//! record namespace.
//!
//! ### Cache-first
//! 1. Cache hit: return it, no network call.
//! 2. Miss: fetch; store a copy when the admission rule accepts the response.
//! 3. Network failure: offline document for HTML requests, else the error.
//!
//! ### Network-first
//! 1. Fetch; store a copy of every 2xx response (overwrites).
//! 2. Network failure: cached entry, else offline document for HTML, else
//!    the error.
//!
//! Cache read failures count as misses and cache write failures are logged;
//! neither turns a usable network response into an error.

pub mod router;

pub use router::{RoutePolicy, RouteRule, Strategy};

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::ResourceCache;
use crate::http::{Network, Request, Response, ResponseKind};

/// Which network responses cache-first may store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Exactly status 200 and a same-origin (basic) response.
    OkBasic,
    /// Any 2xx response.
    Success,
}

impl Admission {
    pub fn admits(&self, response: &Response) -> bool {
        match self {
            Admission::OkBasic => response.status == 200 && response.kind == ResponseKind::Basic,
            Admission::Success => response.is_success(),
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Network,
    Cache,
    OfflinePage,
    Passthrough,
}

/// A response together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

impl Served {
    pub fn new(response: Response, source: Source) -> Self {
        Self { response, source }
    }
}

/// The collaborators a strategy runs against.
pub struct StrategyContext<'a> {
    pub cache: &'a dyn ResourceCache,
    pub network: &'a dyn Network,
    /// Absolute URL of the offline document.
    pub offline_url: &'a str,
    pub admission: Admission,
}

impl StrategyContext<'_> {
    /// Run the given strategy for a request.
    pub async fn run(&self, strategy: Strategy, request: &Request) -> Result<Served, Error> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    pub async fn cache_first(&self, request: &Request) -> Result<Served, Error> {
        let key = request.url.as_str();
        if let Some(cached) = self.lookup(key).await {
            tracing::debug!(url = key, "cache-first hit");
            return Ok(Served::new(cached, Source::Cache));
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if self.admission.admits(&response) {
                    self.store(key, &response).await;
                } else {
                    tracing::debug!(url = key, status = response.status, "response not admitted to cache");
                }
                Ok(Served::new(response, Source::Network))
            }
            Err(e) => {
                tracing::debug!(url = key, error = %e, "cache-first network failure");
                self.offline_fallback(request, e).await
            }
        }
    }

    pub async fn network_first(&self, request: &Request) -> Result<Served, Error> {
        let key = request.url.as_str();
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(key, &response).await;
                }
                Ok(Served::new(response, Source::Network))
            }
            Err(e) => {
                tracing::debug!(url = key, error = %e, "network-first network failure, trying cache");
                if let Some(cached) = self.lookup(key).await {
                    return Ok(Served::new(cached, Source::Cache));
                }
                self.offline_fallback(request, e).await
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        match self.cache.get(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = key, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &Response) {
        if let Err(e) = self.cache.put(key, response).await {
            tracing::warn!(url = key, error = %e, "failed to store response");
        }
    }

    /// Serve the offline document to HTML requests; surface `cause` otherwise.
    async fn offline_fallback(&self, request: &Request, cause: Error) -> Result<Served, Error> {
        if !request.accepts_html() {
            return Err(cause);
        }
        match self.lookup(self.offline_url).await {
            Some(page) => {
                tracing::info!(url = %request.url, "serving offline document");
                Ok(Served::new(page, Source::OfflinePage))
            }
            None => Err(Error::Offline(format!("{} (offline document not cached)", request.url))),
        }
    }
}
