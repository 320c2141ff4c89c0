//! marknav MCP server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use marknav_client::CloudflareKv;
use marknav_core::{AppConfig, KvNamespace, Services};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let store: Option<Arc<dyn KvNamespace>> = match &config.kv {
        Some(kv) => Some(Arc::new(CloudflareKv::new(kv)?)),
        None => {
            tracing::info!("no remote store configured, serving the bundled dataset read-only");
            None
        }
    };

    let services = Arc::new(Services::build(&config, store).await?);
    tracing::info!(strategy = %config.cache.strategy, "Starting marknav server on stdio transport");

    let handler = handler::MarknavServer::new(services);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
