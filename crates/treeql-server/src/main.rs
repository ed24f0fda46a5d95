//! TreeQL server entry point
//!
//! Usage: `treeql [config.json]`

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use treeql_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => ServerConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("TreeQL v{}", Server::version());

    let server = Server::new(config).context("failed to create server")?;
    server.start().await.context("failed to start server")?;

    info!("Press Ctrl+C to stop the server");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    server.stop().await?;
    info!("Goodbye!");
    Ok(())
}
