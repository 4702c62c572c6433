//! Client connection error types

use thiserror::Error;

/// Errors surfaced by the [`ConnectionManager`](super::ConnectionManager)
///
/// `Clone + PartialEq` so the last one can be published in the status
/// watch channel and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// `send()` called while the connection is not Open; nothing was queued
    #[error("Connection is not open")]
    NotOpen,

    /// Opening the physical connection failed
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Read or write error on a live connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed by the remote side or the network
    #[error("Connection closed (code: {code:?})")]
    Closed { code: Option<u16> },

    /// Terminal: reconnect bound reached, an explicit `connect()` is required
    #[error("Max reconnect attempts reached ({attempts})")]
    ReconnectExhausted { attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The driver task is gone
    #[error("Connection manager stopped")]
    ManagerStopped,
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl ClientError {
    /// True for the terminal state that stops automatic reconnection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::ReconnectExhausted { .. })
    }
}
