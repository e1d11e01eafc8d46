//! offline-h5 server entry point.
//!
//! Loads configuration, opens the local database, brings the offline runtime
//! up and exposes the page over the MCP stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offline_h5_client::{HttpNetwork, NetworkConfig};
use offline_h5_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod host;
#[cfg(test)]
mod testing;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        origin = %config.origin,
        worker_supported = config.worker_supported,
        cache_version = %config.cache_version,
        "Starting offline-h5 server on stdio transport"
    );

    let network = HttpNetwork::new(NetworkConfig {
        user_agent: config.user_agent.clone(),
        timeout: config.timeout(),
        ..Default::default()
    })?;

    let host = Arc::new(host::Host::open(config, Arc::new(network)).await?);
    host.start().await?;
    let background = host.spawn_background();

    let handler = handler::OfflineH5Server::new(Arc::clone(&host));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    for task in background {
        task.abort();
    }

    Ok(())
}
