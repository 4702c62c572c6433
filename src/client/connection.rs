//! Resilient channel connection
//!
//! [`ConnectionManager`] is a cloneable handle over a single driver task that
//! owns the physical connection. Every lifecycle step (open, inbound frame,
//! close, backoff expiry, application command) is handled on that one task,
//! so no two of them ever run at the same time for a handle.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ok──▶ Open ──close/error──▶ Closed
//!                        │                                    │
//!                        └──fail──▶ Closed ◀──backoff 2^n──────┘
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;

use super::errors::ClientError;
use super::reconnect::{classify_close, CloseKind, ReconnectPolicy, NORMAL_CLOSURE};
use super::transport::{Connector, Frame, Transport};

/// Observable connection lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot published on every transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Retries scheduled since the last successful open
    pub reconnect_attempt: u32,
    pub last_error: Option<ClientError>,
    /// A backoff timer is armed
    pub reconnect_pending: bool,
    /// Inbound messages that parsed and reached the inbox
    pub messages_received: u64,
}

enum Command {
    Connect,
    Disconnect,
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
}

/// Handle to a managed connection. Clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionManager {
    /// Spawn the driver task. Starts Idle; call [`connect`](Self::connect).
    ///
    /// Parsed inbound messages are delivered on the returned receiver.
    pub fn spawn<M, C>(config: &ClientConfig, connector: C) -> (Self, mpsc::UnboundedReceiver<M>)
    where
        M: DeserializeOwned + Send + 'static,
        C: Connector,
    {
        Self::spawn_with_policy(config.url.clone(), config.reconnect_policy(), connector)
    }

    pub fn spawn_with_policy<M, C>(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<M>)
    where
        M: DeserializeOwned + Send + 'static,
        C: Connector,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: url.into(),
            policy,
            connector: Arc::new(connector),
            commands: command_rx,
            status: status_tx,
            inbox: inbox_tx,
            attempt: 0,
            _message: PhantomData,
        };
        tokio::spawn(driver.run());

        (
            Self {
                commands: command_tx,
                status: status_rx,
            },
            inbox_rx,
        )
    }

    /// Open the connection. Resets the attempt counter when idle, including
    /// after the reconnect bound was reached.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.command(Command::Connect)
    }

    /// Cancel any pending reconnect and close intentionally. No-op when
    /// there is no connection.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect)
    }

    /// Serialize and send `message` if the connection is Open.
    ///
    /// Never queues: a non-Open connection fails with `NotOpen`.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotOpen);
        }

        let text = serde_json::to_string(message)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Send {
            text,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| ClientError::ManagerStopped)?
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Subscribe to status changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ManagerStopped)
    }
}

// =============================================================================
// Driver
// =============================================================================

enum Phase {
    /// No connection and no timer; waiting for a command
    Idle,
    Connecting,
    Open(Box<dyn Transport>),
    Backoff(Instant),
    Shutdown,
}

struct Driver<M, C> {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<C>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    inbox: mpsc::UnboundedSender<M>,
    attempt: u32,
    _message: PhantomData<fn() -> M>,
}

impl<M, C> Driver<M, C>
where
    M: DeserializeOwned + Send + 'static,
    C: Connector,
{
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.drive_idle().await,
                Phase::Connecting => self.drive_connecting().await,
                Phase::Open(link) => self.drive_open(link).await,
                Phase::Backoff(deadline) => self.drive_backoff(deadline).await,
                Phase::Shutdown => break,
            };
        }
        debug!(url = %self.url, "Connection driver stopped");
    }

    async fn drive_idle(&mut self) -> Phase {
        match self.commands.recv().await {
            Some(Command::Connect) => self.start_connect(),
            Some(Command::Disconnect) => Phase::Idle,
            Some(Command::Send { reply, .. }) => {
                let _ = reply.send(Err(ClientError::NotOpen));
                Phase::Idle
            }
            None => Phase::Shutdown,
        }
    }

    /// Explicit connect from the application: fresh attempt budget.
    fn start_connect(&mut self) -> Phase {
        self.attempt = 0;
        self.update(|s| {
            s.reconnect_attempt = 0;
            s.reconnect_pending = false;
        });
        Phase::Connecting
    }

    async fn drive_connecting(&mut self) -> Phase {
        self.update(|s| s.state = ConnectionState::Connecting);
        info!(url = %self.url, attempt = self.attempt, "Connecting");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let open = async move { connector.open(&url).await };
        tokio::pin!(open);

        loop {
            tokio::select! {
                result = &mut open => {
                    return match result {
                        Ok(link) => {
                            self.attempt = 0;
                            self.update(|s| {
                                s.state = ConnectionState::Open;
                                s.reconnect_attempt = 0;
                                s.last_error = None;
                            });
                            info!(url = %self.url, "Connection open");
                            Phase::Open(link)
                        }
                        Err(e) => {
                            warn!(url = %self.url, error = %e, "Connect failed");
                            self.update(|s| {
                                s.state = ConnectionState::Closed;
                                s.last_error = Some(e);
                            });
                            self.schedule_reconnect()
                        }
                    };
                }
                command = self.commands.recv() => match command {
                    // Dropping `open` abandons the attempt; nothing it opens survives
                    Some(Command::Disconnect) => {
                        info!(url = %self.url, "Disconnect during connect, attempt abandoned");
                        self.update(|s| s.state = ConnectionState::Closed);
                        return Phase::Idle;
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(ClientError::NotOpen));
                    }
                    None => return Phase::Shutdown,
                },
            }
        }
    }

    async fn drive_open(&mut self, mut link: Box<dyn Transport>) -> Phase {
        loop {
            tokio::select! {
                frame = link.next_frame() => match frame {
                    Frame::Text(text) => self.handle_message(text.as_bytes()),
                    Frame::Binary(data) => self.handle_message(&data),
                    Frame::Error(e) => {
                        // The close that follows drives reconnection
                        warn!(url = %self.url, error = %e, "Transport error");
                        self.update(|s| s.last_error = Some(ClientError::Transport(e)));
                    }
                    Frame::Closed(code) => return self.handle_close(code, false),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send { text, reply }) => {
                        let _ = reply.send(link.send_text(text).await);
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect) => {
                        self.close_link(link).await;
                        return self.handle_close(Some(NORMAL_CLOSURE), true);
                    }
                    None => {
                        self.close_link(link).await;
                        return Phase::Shutdown;
                    }
                },
            }
        }
    }

    async fn drive_backoff(&mut self, deadline: Instant) -> Phase {
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    self.update(|s| s.reconnect_pending = false);
                    return Phase::Connecting;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Disconnect) => {
                        info!(url = %self.url, "Pending reconnect cancelled");
                        self.update(|s| s.reconnect_pending = false);
                        return Phase::Idle;
                    }
                    Some(Command::Connect) => return self.start_connect(),
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(ClientError::NotOpen));
                    }
                    None => return Phase::Shutdown,
                },
            }
        }
    }

    fn handle_message(&mut self, raw: &[u8]) {
        match serde_json::from_slice::<M>(raw) {
            Ok(message) => {
                self.update(|s| s.messages_received += 1);
                // Application may have dropped the inbox; keep the connection anyway
                let _ = self.inbox.send(message);
            }
            Err(e) => {
                warn!(
                    url = %self.url,
                    error = %e,
                    bytes = raw.len(),
                    "Malformed inbound message dropped"
                );
            }
        }
    }

    fn handle_close(&mut self, code: Option<u16>, locally_initiated: bool) -> Phase {
        self.update(|s| s.state = ConnectionState::Closed);

        match classify_close(code, locally_initiated) {
            CloseKind::Intentional => {
                info!(url = %self.url, "Connection closed");
                Phase::Idle
            }
            CloseKind::Abnormal => {
                warn!(url = %self.url, code = ?code, "Connection closed abnormally");
                self.update(|s| {
                    // Keep a more specific error recorded just before the close
                    if !matches!(s.last_error, Some(ClientError::Transport(_))) {
                        s.last_error = Some(ClientError::Closed { code });
                    }
                });
                self.schedule_reconnect()
            }
        }
    }

    fn schedule_reconnect(&mut self) -> Phase {
        match self.policy.next_delay(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                let attempt = self.attempt;
                self.update(|s| {
                    s.reconnect_attempt = attempt;
                    s.reconnect_pending = true;
                });
                info!(
                    url = %self.url,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                Phase::Backoff(Instant::now() + delay)
            }
            None => {
                let attempts = self.attempt;
                error!(url = %self.url, attempts, "Max reconnect attempts reached, giving up");
                self.update(|s| {
                    s.reconnect_pending = false;
                    s.last_error = Some(ClientError::ReconnectExhausted { attempts });
                });
                Phase::Idle
            }
        }
    }

    async fn close_link(&mut self, mut link: Box<dyn Transport>) {
        self.update(|s| s.state = ConnectionState::Closing);
        if let Err(e) = link.close().await {
            debug!(url = %self.url, error = %e, "Close handshake failed");
        }
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) {
        self.status.send_modify(f);
    }
}
