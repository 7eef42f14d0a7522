// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Chat entities and their local sync status.
//!
//! Channels, messages and reactions created or edited locally carry a
//! [`SyncStatus`]. Together they form the set of [`PendingMutation`]s that
//! the sync orchestrator pushes to the server after a reconnect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        User {
            id: id.into(),
            name: None,
            image: None,
        }
    }
}

/// Local synchronization status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Confirmed by the server.
    Completed,
    /// A request for this entity is in flight.
    InProgress,
    /// Waiting to be (re)sent.
    SyncNeeded,
    /// Message waiting for its attachments to finish uploading.
    AwaitingAttachments,
    /// Rejected by the server; will not be retried.
    FailedPermanently,
}

impl SyncStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::SyncNeeded => "sync_needed",
            SyncStatus::AwaitingAttachments => "awaiting_attachments",
            SyncStatus::FailedPermanently => "failed_permanently",
        }
    }

    /// Check if a transition from this status to target is valid.
    ///
    /// Writing the current status again is always allowed and changes nothing.
    pub fn can_transition_to(&self, target: SyncStatus) -> bool {
        use SyncStatus::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (SyncNeeded, InProgress)
                | (AwaitingAttachments, InProgress)
                | (AwaitingAttachments, FailedPermanently)
                | (InProgress, Completed)
                | (InProgress, SyncNeeded)
                | (InProgress, FailedPermanently)
        )
    }

    /// Get valid transition targets as a formatted string.
    pub fn valid_targets(&self) -> String {
        match self {
            SyncStatus::SyncNeeded => "in_progress".to_string(),
            SyncStatus::AwaitingAttachments => "in_progress, failed_permanently".to_string(),
            SyncStatus::InProgress => "completed, sync_needed, failed_permanently".to_string(),
            SyncStatus::Completed | SyncStatus::FailedPermanently => "(none)".to_string(),
        }
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::FailedPermanently)
    }

    /// Validates a transition, returning [`Error::InvalidTransition`] on failure.
    pub fn check_transition(&self, target: SyncStatus) -> Result<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
                valid_targets: self.valid_targets(),
            })
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(SyncStatus::Completed),
            "in_progress" => Ok(SyncStatus::InProgress),
            "sync_needed" => Ok(SyncStatus::SyncNeeded),
            "awaiting_attachments" => Ok(SyncStatus::AwaitingAttachments),
            "failed_permanently" => Ok(SyncStatus::FailedPermanently),
            _ => Err(Error::InvalidSyncStatus(s.to_string())),
        }
    }
}

/// Upload progress of a message attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    InProgress,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub upload_state: UploadState,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub cid: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default = "default_sync_status")]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_locally_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_locally_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted_for_me: bool,
}

fn default_sync_status() -> SyncStatus {
    SyncStatus::Completed
}

impl Message {
    /// Creates a message composed locally and not yet sent.
    pub fn local(
        id: impl Into<String>,
        cid: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Message {
            id: id.into(),
            cid: cid.into(),
            text: text.into(),
            user_id: user_id.into(),
            attachments: Vec::new(),
            sync_status: SyncStatus::SyncNeeded,
            created_at: None,
            created_locally_at: Some(now),
            updated_locally_at: None,
            deleted_at: None,
            deleted_for_me: false,
        }
    }

    pub fn has_failed_attachment(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.upload_state == UploadState::Failed)
    }

    /// The most recent local timestamp, used to decide whether a retry is stale.
    pub fn local_timestamp(&self) -> Option<DateTime<Utc>> {
        [
            self.deleted_at,
            self.updated_locally_at,
            self.created_locally_at,
            self.created_at,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

/// A reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enforce_unique: bool,
    #[serde(default = "default_sync_status")]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_locally_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Reaction {
    pub fn local_timestamp(&self) -> Option<DateTime<Utc>> {
        [self.deleted_at, self.created_locally_at, self.created_at]
            .into_iter()
            .flatten()
            .max()
    }
}

/// A channel. `cid` is `<type>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub cid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_sync_status")]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn new(cid: impl Into<String>) -> Self {
        Channel {
            cid: cid.into(),
            members: Vec::new(),
            name: None,
            sync_status: SyncStatus::Completed,
            created_at: None,
        }
    }

    /// Splits the cid into channel type and channel id.
    pub fn type_and_id(&self) -> Result<(&str, &str)> {
        split_cid(&self.cid)
    }
}

/// Splits `<type>:<id>` into its parts.
pub fn split_cid(cid: &str) -> Result<(&str, &str)> {
    match cid.split_once(':') {
        Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok((kind, id)),
        _ => Err(Error::InvalidCid(cid.to_string())),
    }
}

/// The kind of a pending mutation, in retry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Channel,
    Message,
    Reaction,
}

impl MutationKind {
    /// Kinds in the order they are retried after a reconnect.
    pub const RETRY_ORDER: [MutationKind; 3] = [
        MutationKind::Channel,
        MutationKind::Message,
        MutationKind::Reaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Channel => "channel",
            MutationKind::Message => "message",
            MutationKind::Reaction => "reaction",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "channel" => Ok(MutationKind::Channel),
            "message" => Ok(MutationKind::Message),
            "reaction" => Ok(MutationKind::Reaction),
            _ => Err(Error::InvalidMutationKind(s.to_string())),
        }
    }
}

/// A locally originated entity waiting for server confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum PendingMutation {
    Channel(Channel),
    Message(Message),
    Reaction(Reaction),
}

impl PendingMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            PendingMutation::Channel(_) => MutationKind::Channel,
            PendingMutation::Message(_) => MutationKind::Message,
            PendingMutation::Reaction(_) => MutationKind::Reaction,
        }
    }

    /// Store key; channels are keyed by cid.
    pub fn id(&self) -> &str {
        match self {
            PendingMutation::Channel(c) => &c.cid,
            PendingMutation::Message(m) => &m.id,
            PendingMutation::Reaction(r) => &r.id,
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        match self {
            PendingMutation::Channel(c) => c.sync_status,
            PendingMutation::Message(m) => m.sync_status,
            PendingMutation::Reaction(r) => r.sync_status,
        }
    }

    pub fn set_sync_status(&mut self, status: SyncStatus) {
        match self {
            PendingMutation::Channel(c) => c.sync_status = status,
            PendingMutation::Message(m) => m.sync_status = status,
            PendingMutation::Reaction(r) => r.sync_status = status,
        }
    }

    pub fn local_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PendingMutation::Channel(c) => c.created_at,
            PendingMutation::Message(m) => m.local_timestamp(),
            PendingMutation::Reaction(r) => r.local_timestamp(),
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
