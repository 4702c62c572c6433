//! Client module - Resilient subscriber connection to a broadcast channel
//!
//! ```ignore
//! use spot_arb_feed::client::{ConnectionManager, WsConnector};
//! use spot_arb_feed::core::ChannelEvent;
//!
//! let (manager, mut inbox) = ConnectionManager::spawn::<ChannelEvent, _>(&config.client, WsConnector);
//! manager.connect()?;
//! while let Some(event) = inbox.recv().await { /* ... */ }
//! ```

pub mod connection;
pub mod errors;
pub mod reconnect;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use errors::ClientError;
pub use reconnect::{backoff_delay, classify_close, CloseKind, ReconnectPolicy, NORMAL_CLOSURE};
pub use transport::{Connector, Frame, Transport, WsConnector, WsTransport};
