//! Physical connection seam
//!
//! The connection manager only talks to [`Connector`] and [`Transport`], so
//! reconnect behavior can be driven by scripted transports in tests. The
//! production implementation is tokio-tungstenite over native-tls.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::errors::ClientError;

/// Type alias for the WebSocket stream with optional TLS
pub type TlsWebSocketStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One inbound item from a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Connection ended; close code if the peer sent one
    Closed(Option<u16>),
    /// Transport-level error; a `Closed` is expected to follow
    Error(String),
}

/// Opens a fresh physical connection per attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, ClientError>;
}

/// One physical connection. Never reused across attempts.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError>;

    /// Next data frame or terminal signal. Must be cancel-safe.
    async fn next_frame(&mut self) -> Frame;

    /// Close with a normal-closure code (1000).
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// WebSocket connector (TLSv1.2 minimum for `wss://`)
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, ClientError> {
        let tls = native_tls::TlsConnector::builder()
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
            .build()
            .map_err(|e| ClientError::ConnectFailed(format!("TLS error: {}", e)))?;

        let (stream, _response) = connect_async_tls_with_config(
            url,
            None,
            false,
            Some(tokio_tungstenite::Connector::NativeTls(tls)),
        )
        .await
        .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;

        Ok(Box::new(WsTransport::new(stream)))
    }
}

pub struct WsTransport {
    stream: TlsWebSocketStream,
    failed: bool,
}

impl WsTransport {
    pub fn new(stream: TlsWebSocketStream) -> Self {
        Self {
            stream,
            failed: false,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn next_frame(&mut self) -> Frame {
        // After an error, report the close that it implies
        if self.failed {
            return Frame::Closed(None);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text),
                Some(Ok(Message::Binary(data))) => return Frame::Binary(data),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // tungstenite answers pings itself
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    debug!(code = ?code, "Close frame received");
                    return Frame::Closed(code);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Frame::Closed(None);
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Frame::Error(e.to_string());
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
