// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Command surface used to resubmit offline work.
//!
//! [`ChatApi`] is the request/response side of the chat service. The sync
//! orchestrator drives it to retry pending mutations, replay event history
//! and restore watched channels. The HTTP client behind it lives outside
//! this crate.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use parley_core::{Channel, ChatError, ChatEvent, Message, Reaction, SyncCheckpoint};
use serde::{Deserialize, Serialize};

/// Failure of a single command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(ChatError),

    /// The history window holds more events than the server will return.
    #[error("too many events to sync")]
    TooManyEventsToSync,
}

impl ApiError {
    /// True when resending the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            ApiError::Request(err) => err.is_permanent(),
            ApiError::TooManyEventsToSync => false,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError::Request(err)
    }
}

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Which channels a query selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFilter {
    CidIn(Vec<String>),
    /// Server-side filter expression, passed through untouched.
    Custom(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChannelsRequest {
    pub filter: ChannelFilter,
    #[serde(default)]
    pub offset: usize,
    pub limit: usize,
    /// Subscribe to the returned channels.
    #[serde(default)]
    pub watch: bool,
}

impl QueryChannelsRequest {
    pub const DEFAULT_LIMIT: usize = 30;

    pub fn new(filter: ChannelFilter) -> Self {
        QueryChannelsRequest {
            filter,
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
            watch: true,
        }
    }

    /// Watches exactly the given channels.
    pub fn for_cids(cids: Vec<String>) -> Self {
        let limit = cids.len().max(1);
        QueryChannelsRequest {
            limit,
            ..Self::new(ChannelFilter::CidIn(cids))
        }
    }

    /// Same query, from the first page.
    pub fn first_page(&self) -> Self {
        QueryChannelsRequest {
            offset: 0,
            ..self.clone()
        }
    }
}

/// Lower bound of a history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSince {
    /// The server's own timestamp string, preferred when known.
    Raw(String),
    Timestamp(DateTime<Utc>),
}

impl SyncSince {
    /// Window start for `checkpoint`, or `None` if it was never synced.
    pub fn from_checkpoint(checkpoint: &SyncCheckpoint) -> Option<Self> {
        match (&checkpoint.last_synced_raw, checkpoint.last_synced_at) {
            (Some(raw), _) => Some(SyncSince::Raw(raw.clone())),
            (None, Some(at)) => Some(SyncSince::Timestamp(at)),
            (None, None) => None,
        }
    }
}

/// Requests the orchestrator issues against the chat service.
pub trait ChatApi: Send + Sync {
    fn create_channel(&self, channel: Channel) -> ApiFuture<'_, Channel>;

    fn send_message(&self, message: Message) -> ApiFuture<'_, Message>;

    fn update_message(&self, message: Message) -> ApiFuture<'_, Message>;

    fn delete_message(&self, message_id: String) -> ApiFuture<'_, Message>;

    fn delete_message_for_me(&self, message_id: String) -> ApiFuture<'_, Message>;

    fn send_reaction(&self, reaction: Reaction, enforce_unique: bool) -> ApiFuture<'_, Reaction>;

    fn delete_reaction(&self, message_id: String, reaction_type: String) -> ApiFuture<'_, ()>;

    fn query_channels(&self, request: QueryChannelsRequest) -> ApiFuture<'_, Vec<Channel>>;

    /// Subscribes to one channel even if no query returns it.
    fn watch_channel(&self, cid: String) -> ApiFuture<'_, Channel>;

    /// Events on `cids` created at or after `since`.
    fn get_event_history_since(
        &self,
        cids: Vec<String>,
        since: SyncSince,
    ) -> ApiFuture<'_, Vec<ChatEvent>>;
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
