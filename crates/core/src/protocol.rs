// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Events exchanged over the chat socket.
//!
//! Every frame is a JSON object. Domain events carry a `type` tag and a
//! `created_at` timestamp; transport-level failures arrive as an
//! [`ErrorEnvelope`] with an `error` body instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat_error::{ChatError, ErrorCode};
use crate::model::{Channel, Message, Reaction, User};

/// Server acknowledgement of a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedEvent {
    pub connection_id: String,
    pub me: User,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

/// Liveness heartbeat; also sent by the client as a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEvent {
    pub connection_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub cid: String,
    pub message: Message,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub cid: String,
    pub reaction: Reaction,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

/// The user marked every channel read at `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllReadEvent {
    pub user: User,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub cid: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_created_at: Option<String>,
}

/// A domain event received from (or sent to) the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "connection.ok")]
    Connected(ConnectedEvent),
    #[serde(rename = "health.check")]
    Health(HealthEvent),
    #[serde(rename = "message.new")]
    MessageNew(MessageEvent),
    #[serde(rename = "message.updated")]
    MessageUpdated(MessageEvent),
    #[serde(rename = "message.deleted")]
    MessageDeleted(MessageEvent),
    #[serde(rename = "reaction.new")]
    ReactionNew(ReactionEvent),
    #[serde(rename = "reaction.deleted")]
    ReactionDeleted(ReactionEvent),
    #[serde(rename = "channel.updated")]
    ChannelUpdated(ChannelEvent),
    #[serde(rename = "channel.deleted")]
    ChannelDeleted(ChannelEvent),
    #[serde(rename = "notification.mark_all_read")]
    MarkAllRead(MarkAllReadEvent),
    #[serde(rename = "typing.start")]
    TypingStart(TypingEvent),
    #[serde(rename = "typing.stop")]
    TypingStop(TypingEvent),
    /// Any event type this client does not model.
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    /// Builds the heartbeat sent by the health monitor.
    pub fn health_check(connection_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        ChatEvent::Health(HealthEvent {
            connection_id: connection_id.into(),
            created_at: now,
            raw_created_at: None,
        })
    }

    /// The wire `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::Connected(_) => "connection.ok",
            ChatEvent::Health(_) => "health.check",
            ChatEvent::MessageNew(_) => "message.new",
            ChatEvent::MessageUpdated(_) => "message.updated",
            ChatEvent::MessageDeleted(_) => "message.deleted",
            ChatEvent::ReactionNew(_) => "reaction.new",
            ChatEvent::ReactionDeleted(_) => "reaction.deleted",
            ChatEvent::ChannelUpdated(_) => "channel.updated",
            ChatEvent::ChannelDeleted(_) => "channel.deleted",
            ChatEvent::MarkAllRead(_) => "notification.mark_all_read",
            ChatEvent::TypingStart(_) => "typing.start",
            ChatEvent::TypingStop(_) => "typing.stop",
            ChatEvent::Unknown => "unknown",
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ChatEvent::Connected(e) => Some(e.created_at),
            ChatEvent::Health(e) => Some(e.created_at),
            ChatEvent::MessageNew(e) | ChatEvent::MessageUpdated(e) | ChatEvent::MessageDeleted(e) => {
                Some(e.created_at)
            }
            ChatEvent::ReactionNew(e) | ChatEvent::ReactionDeleted(e) => Some(e.created_at),
            ChatEvent::ChannelUpdated(e) | ChatEvent::ChannelDeleted(e) => Some(e.created_at),
            ChatEvent::MarkAllRead(e) => Some(e.created_at),
            ChatEvent::TypingStart(e) | ChatEvent::TypingStop(e) => Some(e.created_at),
            ChatEvent::Unknown => None,
        }
    }

    /// The server's original timestamp string, when known.
    pub fn raw_created_at(&self) -> Option<&str> {
        self.raw_slot().and_then(|raw| raw.as_deref())
    }

    pub fn set_raw_created_at(&mut self, raw: String) {
        if let Some(slot) = self.raw_slot_mut() {
            *slot = Some(raw);
        }
    }

    pub fn cid(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageNew(e) | ChatEvent::MessageUpdated(e) | ChatEvent::MessageDeleted(e) => {
                Some(&e.cid)
            }
            ChatEvent::ReactionNew(e) | ChatEvent::ReactionDeleted(e) => Some(&e.cid),
            ChatEvent::ChannelUpdated(e) | ChatEvent::ChannelDeleted(e) => Some(&e.cid),
            ChatEvent::TypingStart(e) | ChatEvent::TypingStop(e) => Some(&e.cid),
            _ => None,
        }
    }

    fn raw_slot(&self) -> Option<&Option<String>> {
        match self {
            ChatEvent::Connected(e) => Some(&e.raw_created_at),
            ChatEvent::Health(e) => Some(&e.raw_created_at),
            ChatEvent::MessageNew(e) | ChatEvent::MessageUpdated(e) | ChatEvent::MessageDeleted(e) => {
                Some(&e.raw_created_at)
            }
            ChatEvent::ReactionNew(e) | ChatEvent::ReactionDeleted(e) => Some(&e.raw_created_at),
            ChatEvent::ChannelUpdated(e) | ChatEvent::ChannelDeleted(e) => Some(&e.raw_created_at),
            ChatEvent::MarkAllRead(e) => Some(&e.raw_created_at),
            ChatEvent::TypingStart(e) | ChatEvent::TypingStop(e) => Some(&e.raw_created_at),
            ChatEvent::Unknown => None,
        }
    }

    fn raw_slot_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            ChatEvent::Connected(e) => Some(&mut e.raw_created_at),
            ChatEvent::Health(e) => Some(&mut e.raw_created_at),
            ChatEvent::MessageNew(e) | ChatEvent::MessageUpdated(e) | ChatEvent::MessageDeleted(e) => {
                Some(&mut e.raw_created_at)
            }
            ChatEvent::ReactionNew(e) | ChatEvent::ReactionDeleted(e) => Some(&mut e.raw_created_at),
            ChatEvent::ChannelUpdated(e) | ChatEvent::ChannelDeleted(e) => {
                Some(&mut e.raw_created_at)
            }
            ChatEvent::MarkAllRead(e) => Some(&mut e.raw_created_at),
            ChatEvent::TypingStart(e) | ChatEvent::TypingStop(e) => Some(&mut e.raw_created_at),
            ChatEvent::Unknown => None,
        }
    }
}

/// Body of a transport-level error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "StatusCode", alias = "status_code")]
    pub status_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_info: Option<String>,
}

impl From<ErrorBody> for ChatError {
    fn from(body: ErrorBody) -> Self {
        ChatError::from_server(body.code, body.message, body.status_code)
    }
}

/// A frame of the form `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

impl ErrorEnvelope {
    /// Converts to a chat error, treating a missing body as its own code.
    pub fn into_chat_error(self) -> ChatError {
        match self.error {
            Some(body) => body.into(),
            None => ChatError::new(ErrorCode::NoErrorBody),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
