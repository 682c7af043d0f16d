mod config;

use crate::config::Config;
use anyhow::{Context, Result};
use dotenv::dotenv;
use reforger_rust_core::ServerMonitor;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Reforger server monitor...");

    let config = Config::from_env()?;
    info!(
        "Following {} via {} (rcon: {})",
        config.monitor.reader.source_path(),
        config.monitor.reader.mode.as_str(),
        config
            .monitor
            .rcon
            .as_ref()
            .map(|r| r.address())
            .unwrap_or_else(|| "disabled".to_string())
    );

    let monitor = ServerMonitor::new(config.monitor).context("Failed to build server monitor")?;

    // Bus tap
    let mut events = monitor.subscribe();
    let tap = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(event.as_ref()) {
                Ok(json) => debug!("{:?}: {}", event.kind(), json),
                Err(e) => warn!("Unserializable {:?} event: {}", event.kind(), e),
            }
        }
    });

    monitor.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down");

    monitor.shutdown().await;
    tap.abort();

    info!("Server monitor exited");
    Ok(())
}
