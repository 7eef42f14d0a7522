// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec.
//!
//! Turns raw text frames into either an error envelope or a [`ChatEvent`],
//! and encodes outbound events. [`ParseError`] keeps the three failure modes
//! apart so the dispatcher can map each one to its own [`ErrorCode`].

use serde_json::Value;

use crate::chat_error::{ChatError, ErrorCode};
use crate::protocol::{ChatEvent, ErrorEnvelope};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The server reported an error.
    Error(ChatError),
    /// A domain event.
    Event(ChatEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The frame is not valid JSON or its error body is unreadable.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Valid JSON that is not a recognizable event.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The first event of a connection was not a usable connection ack.
    #[error("malformed connection ack: {0}")]
    MalformedAck(String),
}

impl ParseError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParseError::Malformed(_) => ErrorCode::UnableToParseSocketEvent,
            ParseError::InvalidEvent(_) => ErrorCode::CantParseEvent,
            ParseError::MalformedAck(_) => ErrorCode::CantParseConnectionEvent,
        }
    }

    pub fn into_chat_error(self) -> ChatError {
        let code = self.error_code();
        ChatError::new(code).with_cause(self)
    }
}

/// Codec boundary used by the socket.
pub trait Codec: Send + Sync {
    /// Decodes one inbound frame.
    fn decode(&self, raw: &str) -> Result<Frame, ParseError>;

    /// Encodes an outbound event.
    fn encode(&self, event: &ChatEvent) -> Result<String, ParseError>;

    /// Decodes the first frame of a connection, which must be an ack.
    ///
    /// Error envelopes are passed through as `Ok(Frame::Error)`.
    fn decode_ack(&self, raw: &str) -> Result<Frame, ParseError> {
        match self.decode(raw) {
            Ok(Frame::Event(ChatEvent::Connected(ack))) => {
                Ok(Frame::Event(ChatEvent::Connected(ack)))
            }
            Ok(Frame::Event(other)) => Err(ParseError::MalformedAck(format!(
                "expected connection.ok, got {}",
                other.event_type()
            ))),
            Ok(Frame::Error(err)) => Ok(Frame::Error(err)),
            Err(ParseError::InvalidEvent(detail)) => Err(ParseError::MalformedAck(detail)),
            Err(e) => Err(e),
        }
    }
}

/// JSON implementation of [`Codec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Parses a single event, keeping the original `created_at` string.
    pub fn parse_event(value: Value) -> Result<ChatEvent, ParseError> {
        let raw_created_at = value
            .get("created_at")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut event: ChatEvent =
            serde_json::from_value(value).map_err(|e| ParseError::InvalidEvent(e.to_string()))?;
        if let Some(raw) = raw_created_at {
            if event.raw_created_at().is_none() {
                event.set_raw_created_at(raw);
            }
        }
        Ok(event)
    }

    /// Parses a JSON array of events, as returned by the history endpoint.
    pub fn parse_events(raw: &str) -> Result<Vec<ChatEvent>, ParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;
        match value {
            Value::Array(items) => items.into_iter().map(Self::parse_event).collect(),
            _ => Err(ParseError::Malformed("expected an array of events".to_string())),
        }
    }
}

impl Codec for JsonCodec {
    fn decode(&self, raw: &str) -> Result<Frame, ParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(ParseError::Malformed("frame is not a JSON object".to_string()));
        }

        if value.get("error").is_some_and(|e| !e.is_null()) {
            let envelope: ErrorEnvelope =
                serde_json::from_value(value).map_err(|e| ParseError::Malformed(e.to_string()))?;
            return Ok(Frame::Error(envelope.into_chat_error()));
        }

        Self::parse_event(value).map(Frame::Event)
    }

    fn encode(&self, event: &ChatEvent) -> Result<String, ParseError> {
        serde_json::to_string(event).map_err(|e| ParseError::InvalidEvent(e.to_string()))
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
