//! Channel monitor
//!
//! Subscribes to one feed channel through `ConnectionManager` and logs every
//! event and connection state change. Useful for checking a deployment and
//! for watching reconnect behavior.
//!
//! Usage: `cargo run --bin monitor [ws-url]`

use tracing::{error, info, warn};

use spot_arb_feed::client::{ConnectionManager, ConnectionState, WsConnector};
use spot_arb_feed::config::{constants, init_logging, load_config, ClientConfig};
use spot_arb_feed::core::{BalancePayload, ChannelEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let mut client = match load_config(&constants::config_path()) {
        Ok(config) => config.client,
        Err(e) => {
            warn!(error = %e, "Could not load config, using default client settings");
            ClientConfig::default()
        }
    };
    if let Some(url) = std::env::args().nth(1) {
        client.url = url;
    }
    client.validate()?;

    info!(url = %client.url, max_reconnect_attempts = client.max_reconnect_attempts, "Monitor starting");

    let (manager, mut inbox) = ConnectionManager::spawn::<ChannelEvent, _>(&client, WsConnector);
    let mut status = manager.watch();
    manager.connect()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = inbox.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                info!(
                    state = %current.state,
                    reconnect_attempt = current.reconnect_attempt,
                    reconnect_pending = current.reconnect_pending,
                    messages = current.messages_received,
                    "Connection status"
                );
                if current.state == ConnectionState::Closed && !current.reconnect_pending {
                    if let Some(e) = current.last_error.filter(|e| e.is_terminal()) {
                        error!(error = %e, "Giving up");
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.disconnect()?;
    let _ = status
        .wait_for(|s| s.state != ConnectionState::Open && s.state != ConnectionState::Closing)
        .await;

    info!("Monitor stopped");
    Ok(())
}

fn log_event(event: &ChannelEvent) {
    match event {
        ChannelEvent::SpotArb(record) => {
            info!(
                event = %event.kind(),
                symbol = %record.symbol,
                profit_pct = ?record.profit_percentage,
                buy = %record.buy_side.exchange,
                sell = %record.sell_side.exchange,
                "Opportunity"
            );
        }
        ChannelEvent::TopList(list) => {
            let best = list.first().map(|r| r.symbol.as_str()).unwrap_or("-");
            info!(event = %event.kind(), count = list.len(), best = %best, "Ranking");
        }
        ChannelEvent::BalancesUpdate(BalancePayload::Snapshot(snapshot)) => {
            info!(event = %event.kind(), assets = snapshot.fields().len(), "Balance snapshot");
        }
        ChannelEvent::BalancesUpdate(BalancePayload::Empty) => {
            info!(event = %event.kind(), "No balance data yet");
        }
        ChannelEvent::BalancesUpdate(BalancePayload::Error { error }) => {
            warn!(event = %event.kind(), error = %error, "Balance unavailable on server");
        }
    }
}
