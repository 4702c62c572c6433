//! WebSocket handler for channel subscribers.
//!
//! Each upgraded socket becomes one `ChannelSubscriber`. Outbound events are
//! pre-serialized `{"event": ..., "data": ...}` frames. Inbound frames are
//! best effort: parsed, logged and otherwise ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ChannelState;
use crate::core::broadcaster::{ChannelSubscriber, Subscriber, SubscriberId};

/// WebSocket upgrade handler at GET <channel>
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ChannelState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle an individual subscriber connection.
///
/// Joins the channel (which replays current state), forwards every queued
/// event and leaves the channel when either side goes away.
async fn handle_ws(mut socket: WebSocket, state: ChannelState) {
    let channel = state.broadcaster.name().to_string();
    let (subscriber, mut rx) = ChannelSubscriber::new(state.subscriber_buffer);
    let id = subscriber.id();

    state.broadcaster.on_subscriber_join(subscriber).await;

    loop {
        tokio::select! {
            // Forward channel events to the WS client
            event = rx.recv() => {
                let Some(event) = event else { break };
                if socket.send(Message::Text(event.json.to_string())).await.is_err() {
                    // Client disconnected
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => log_inbound(&channel, id, text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => log_inbound(&channel, id, &data),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(channel = %channel, subscriber = %id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.on_subscriber_leave(id).await;
    info!(channel = %channel, subscriber = %id, "WebSocket client disconnected");
}

/// Inbound events do not affect pipeline state.
fn log_inbound(channel: &str, id: SubscriberId, raw: &[u8]) {
    match serde_json::from_slice::<Value>(raw) {
        Ok(payload) => {
            let event = payload
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            debug!(channel = %channel, subscriber = %id, event = %event, "Inbound event ignored");
        }
        Err(e) => {
            warn!(
                channel = %channel,
                subscriber = %id,
                error = %e,
                bytes = raw.len(),
                "Malformed inbound message dropped"
            );
        }
    }
}
