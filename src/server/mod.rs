//! WebSocket API server for channel broadcasts.
//!
//! Uses `axum` for HTTP/WS routing with CORS support. Every configured
//! channel gets two routes:
//! - `GET <channel>`: WebSocket upgrade, subscribes to the channel
//! - `GET <channel>/snapshot`: current `ChannelTopicState` as JSON

pub mod ws;

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::constants::HEALTH_PATH;
use crate::core::broadcaster::{ChannelBroadcaster, ChannelTopicState};
use crate::core::types::current_time_ms;

/// Per-channel router state.
#[derive(Clone)]
pub struct ChannelState {
    pub broadcaster: Arc<ChannelBroadcaster>,
    /// Outbound queue depth for each subscriber of this channel
    pub subscriber_buffer: usize,
}

/// Build the application router for the given channels.
pub fn router(channels: &[Arc<ChannelBroadcaster>], subscriber_buffer: usize) -> Router {
    let names: Vec<String> = channels.iter().map(|c| c.name().to_string()).collect();

    let mut app: Router = Router::new().route(HEALTH_PATH, get(move || health_handler(names.clone())));

    for broadcaster in channels {
        let path = broadcaster.name().to_string();
        let state = ChannelState {
            broadcaster: Arc::clone(broadcaster),
            subscriber_buffer,
        };
        let channel_routes: Router = Router::new()
            .route(&path, get(ws::ws_handler))
            .route(&format!("{}/snapshot", path), get(snapshot_handler))
            .with_state(state);
        app = app.merge(channel_routes);
    }

    app.layer(CorsLayer::permissive())
}

/// Start the HTTP/WebSocket server on `addr`.
///
/// Blocks until the server shuts down.
pub async fn start_server(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Starting WebSocket API server");
    serve(listener, app).await
}

/// Serve on an already-bound listener (port 0 in tests).
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET /health: server status
async fn health_handler(channels: Vec<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": current_time_ms(),
        "channels": channels,
    }))
}

/// GET <channel>/snapshot: last broadcast list, balance and subscriber count
async fn snapshot_handler(State(state): State<ChannelState>) -> Json<ChannelTopicState> {
    Json(state.broadcaster.topic_state().await)
}
