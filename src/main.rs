//! Spot arbitrage feed server
//!
//! Orchestrates:
//! 1. Config + logging initialization
//! 2. One result source, broadcaster and aggregation loop per channel
//! 3. axum WebSocket API server
//! 4. Ctrl+C graceful shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spot_arb_feed::adapters::HttpResultSource;
use spot_arb_feed::config::{constants, init_logging, load_config, AppConfig};
use spot_arb_feed::core::{AggregationLoop, ChannelBroadcaster};
use spot_arb_feed::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // =========================================================================
    // 1. Config + logging
    // =========================================================================
    dotenvy::dotenv().ok();
    init_logging();

    info!("=== Spot arbitrage feed ===");

    let config_path = constants::config_path();
    let mut config = match load_config(&config_path) {
        Ok(config) => {
            info!(path = %config_path.display(), channels = config.channels.len(), "Config loaded");
            config
        }
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "Could not load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(port) = constants::port_override() {
        config.server.port = port;
    }

    // =========================================================================
    // 2. Channels
    // =========================================================================
    let shutdown = CancellationToken::new();
    let mut broadcasters = Vec::with_capacity(config.channels.len());
    let mut loop_handles = Vec::with_capacity(config.channels.len());

    for channel in &config.channels {
        let source = HttpResultSource::from_config(&channel.source)?;
        let broadcaster = Arc::new(ChannelBroadcaster::new(channel.name.clone(), Arc::new(source)));

        let aggregation = AggregationLoop::new(Arc::clone(&broadcaster), channel.tick_interval());
        loop_handles.push(aggregation.spawn(shutdown.clone()));

        info!(
            channel = %channel.name,
            tick_interval_ms = channel.tick_interval_ms,
            ranking_url = %channel.source.ranking_url,
            "Channel started"
        );
        broadcasters.push(broadcaster);
    }

    // =========================================================================
    // 3. axum WebSocket API server
    // =========================================================================
    let app = server::router(&broadcasters, config.server.subscriber_buffer);
    let addr = config.server.bind_addr();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::start_server(app, &addr).await {
            error!(error = %e, "WebSocket server failed");
        }
    });

    // =========================================================================
    // 4. Wait for Ctrl+C → graceful shutdown
    // =========================================================================
    info!("Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    for handle in loop_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Aggregation loop ended abnormally");
        }
    }
    server_handle.abort();

    info!("=== Shutdown complete ===");
    Ok(())
}
