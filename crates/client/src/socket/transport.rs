// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for the chat socket.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket connections for production
//! - Scripted transports for unit testing
//!
//! A transport carries raw text frames only. Decoding is the dispatcher's
//! job and retry policy belongs to the state machine.

use std::future::Future;
use std::pin::Pin;

use parley_core::{ChatError, ErrorCode, User};
use url::Url;

use super::state::ShutdownReason;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint or query could not be turned into a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The transport did not open in time.
    #[error("connect timed out")]
    Timeout,
}

impl TransportError {
    /// Maps to the chat error reported to listeners.
    pub fn to_chat_error(&self) -> ChatError {
        let code = match self {
            TransportError::ConnectionClosed => ErrorCode::SocketClosed,
            _ => ErrorCode::SocketFailure,
        };
        ChatError::new(code).with_cause(self)
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything needed to open one connection.
///
/// Immutable for the lifetime of an attempt; a reconnect builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub user: User,
    pub token: Option<String>,
    pub anonymous: bool,
    /// Set on automatic reconnects; the server already knows the user.
    pub reconnect: bool,
}

impl ConnectionConfig {
    /// Copy of this config marked as an automatic reconnect.
    pub fn as_reconnect(&self) -> Self {
        ConnectionConfig {
            reconnect: true,
            ..self.clone()
        }
    }

    /// Builds the connect URL with auth and user query parameters.
    pub fn url(&self) -> TransportResult<Url> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let user_payload = if self.reconnect {
            serde_json::json!({ "user_id": self.user.id })
        } else {
            serde_json::json!({ "user_id": self.user.id, "user_details": self.user })
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", &self.api_key);
            query.append_pair(
                "stream-auth-type",
                if self.anonymous { "anonymous" } else { "jwt" },
            );
            if let Some(token) = &self.token {
                query.append_pair("authorization", token);
            }
            query.append_pair("json", &user_payload.to_string());
        }
        Ok(url)
    }
}

/// Transport trait for WebSocket-like communication.
///
/// This trait abstracts over the actual transport mechanism, allowing
/// for easy testing with mock implementations.
pub trait Transport: Send + Sync {
    /// Connect to the server described by `config`.
    fn connect(
        &mut self,
        config: &ConnectionConfig,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Close the connection with a close frame.
    fn disconnect(
        &mut self,
        reason: &ShutdownReason,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Send a text frame.
    fn send(&mut self, text: String)
        -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receive the next text frame.
    ///
    /// Returns `None` if the connection is closed.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<Option<String>>> + Send + '_>>;
}

/// Creates a fresh transport for each connection attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

/// WebSocket transport implementation using tokio-tungstenite.
pub struct WebSocketTransport {
    /// The WebSocket connection, if connected.
    ws: Option<WebSocketConnection>,
}

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        tokio_tungstenite::tungstenite::Message,
    >,
    stream: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport { ws: None }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &mut self,
        config: &ConnectionConfig,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let url = config.url();
        Box::pin(async move {
            use futures_util::StreamExt;

            let url = url?;
            let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            self.ws = Some(WebSocketConnection { sink, stream });
            Ok(())
        })
    }

    fn disconnect(
        &mut self,
        reason: &ShutdownReason,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let reason = reason.clone();
        Box::pin(async move {
            use futures_util::SinkExt;
            use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
            use tokio_tungstenite::tungstenite::protocol::CloseFrame;
            use tokio_tungstenite::tungstenite::Message;

            if let Some(mut ws) = self.ws.take() {
                let frame = CloseFrame {
                    code: CloseCode::from(reason.code),
                    reason: reason.reason.into(),
                };
                // The peer may already be gone; closing is best effort.
                let _ = ws.sink.send(Message::Close(Some(frame))).await;
                let _ = ws.sink.close().await;
            }
            Ok(())
        })
    }

    fn send(
        &mut self,
        text: String,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::SinkExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            if let Err(e) = ws.sink.send(Message::Text(text.into())).await {
                self.ws = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }

            if let Err(e) = ws.sink.flush().await {
                self.ws = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }

            Ok(())
        })
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<Option<String>>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            loop {
                match ws.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                    Some(Ok(Message::Close(_))) => {
                        self.ws = None;
                        return Ok(None);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.ws = None;
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                    None => {
                        self.ws = None;
                        return Ok(None);
                    }
                }
            }
        })
    }
}

/// Factory for [`WebSocketTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransportFactory;

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new())
    }
}
