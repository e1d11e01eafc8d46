//! The request interception seam.
//!
//! The host picks one interceptor at start-up: the worker when the runtime
//! supports it, the fallback controller otherwise. Both answer the same call.

use crate::Error;
use crate::http::{Network, Request};
use crate::strategy::{Served, Source};

#[async_trait::async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Serve one outgoing request.
    async fn intercept(&self, request: Request) -> Result<Served, Error>;

    /// Short name of the runtime mode, for status reports.
    fn mode(&self) -> &'static str;
}

/// Send the request to the network untouched.
pub async fn pass_through(network: &dyn Network, request: &Request) -> Result<Served, Error> {
    let response = network.fetch(request).await?;
    Ok(Served::new(response, Source::Passthrough))
}
