//! tidecache server entry point.
//!
//! Boots the cache engine, runs install and activation, then serves the MCP
//! tools on stdio transport. Logging goes to stderr to avoid interfering with
//! the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tidecache_client::{FetchConfig, HttpNetwork};
use tidecache_core::{AppConfig, CacheEngine, EngineConfig, Event, PartitionStore, spawn_eviction_task};
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
    tracing::info!(origin = %config.origin, version = %config.version, "Starting tidecache server on stdio transport");

    let store = PartitionStore::open(&config.db_path).await?;
    let network = HttpNetwork::new(FetchConfig::from(&config))?;
    let engine = CacheEngine::new(store, Arc::new(network), EngineConfig::from_app(&config)?);

    match engine.dispatch(Event::Install).await {
        Ok(_) => {
            if let Err(e) = engine.dispatch(Event::Activate).await {
                tracing::warn!("activation failed: {e}");
            }
        }
        Err(e) => tracing::warn!("install failed, retry with the install tool: {e}"),
    }

    let eviction = spawn_eviction_task(engine.clone(), config.eviction_interval());

    let handler = handler::TideCacheServer::new(engine.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    eviction.abort();
    let drained = engine.drain_background().await;
    tracing::info!(drained, "tidecache server stopped");

    Ok(())
}
