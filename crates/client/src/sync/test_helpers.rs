// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use parley_core::{
    Attachment, Channel, ChatError, ChatEvent, ErrorCode, ManualClock, MarkAllReadEvent, Message,
    MessageEvent, PendingMutation, Reaction, SqliteStore, Store, SyncStatus, UploadState, User,
};

use tokio::sync::Notify;

use super::orchestrator::{SyncConfig, SyncOrchestrator};
use crate::commands::{ApiError, ApiFuture, ChannelFilter, ChatApi, QueryChannelsRequest, SyncSince};

pub const USER: &str = "alice";

/// `2026-03-01T00:00:00Z` plus `secs`.
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// Clock reading used by [`harness`].
pub fn now() -> DateTime<Utc> {
    t(10_000)
}

pub fn message_event(id: &str, at: DateTime<Utc>) -> ChatEvent {
    ChatEvent::MessageNew(MessageEvent {
        cid: "messaging:general".to_string(),
        message: Message::local(id, "messaging:general", "bob", "hi", at),
        created_at: at,
        raw_created_at: Some(at.to_rfc3339()),
    })
}

pub fn mark_all_read_event(user_id: &str, at: DateTime<Utc>) -> MarkAllReadEvent {
    MarkAllReadEvent {
        user: User::new(user_id),
        created_at: at,
        raw_created_at: Some(at.to_rfc3339()),
    }
}

pub fn pending_message(id: &str, at: DateTime<Utc>) -> Message {
    Message::local(id, "messaging:general", USER, "offline hello", at)
}

pub fn pending_reaction(id: &str, message_id: &str, at: DateTime<Utc>) -> Reaction {
    Reaction {
        id: id.to_string(),
        message_id: message_id.to_string(),
        kind: "like".to_string(),
        user_id: USER.to_string(),
        score: 1,
        enforce_unique: false,
        sync_status: SyncStatus::SyncNeeded,
        created_at: None,
        created_locally_at: Some(at),
        deleted_at: None,
    }
}

pub fn pending_channel(cid: &str, at: DateTime<Utc>) -> Channel {
    Channel {
        sync_status: SyncStatus::SyncNeeded,
        created_at: Some(at),
        ..Channel::new(cid)
    }
}

pub fn failed_attachment() -> Attachment {
    Attachment {
        asset_url: None,
        mime_type: Some("image/png".to_string()),
        upload_state: UploadState::Failed,
    }
}

pub fn server_error(status_code: i32) -> ApiError {
    ApiError::Request(ChatError::from_server(
        ErrorCode::ValidationError.code(),
        "rejected",
        status_code,
    ))
}

/// Scripted chat service that records every call as `op:subject`.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    history: Mutex<VecDeque<Result<Vec<ChatEvent>, ApiError>>>,
    history_requests: Mutex<Vec<(Vec<String>, SyncSince)>>,
    failures: Mutex<HashMap<String, ApiError>>,
    /// Channels the server knows, returned by cid queries.
    server_channels: Mutex<BTreeMap<String, Channel>>,
    /// Returned by custom-filter queries.
    query_results: Mutex<Vec<Channel>>,
    disconnect_on: Mutex<Option<(String, Arc<AtomicBool>)>>,
    /// Subjects whose requests hang until released.
    stalled: Mutex<HashSet<String>>,
    released: Notify,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(MockApi::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Next history response; an empty queue answers with no events.
    pub fn queue_history(&self, result: Result<Vec<ChatEvent>, ApiError>) {
        self.history.lock().unwrap().push_back(result);
    }

    pub fn history_requests(&self) -> Vec<(Vec<String>, SyncSince)> {
        self.history_requests.lock().unwrap().clone()
    }

    /// Fails every request about `subject` with `err`.
    pub fn fail(&self, subject: &str, err: ApiError) {
        self.failures
            .lock()
            .unwrap()
            .insert(subject.to_string(), err);
    }

    pub fn add_server_channel(&self, cid: &str) {
        self.server_channels
            .lock()
            .unwrap()
            .insert(cid.to_string(), Channel::new(cid));
    }

    pub fn set_query_results(&self, cids: &[&str]) {
        *self.query_results.lock().unwrap() = cids.iter().map(|c| Channel::new(*c)).collect();
    }

    /// Clears `gate` when a request about `subject` arrives.
    pub fn disconnect_on(&self, subject: &str, gate: Arc<AtomicBool>) {
        *self.disconnect_on.lock().unwrap() = Some((subject.to_string(), gate));
    }

    /// Makes requests about `subject` hang until [`MockApi::release`].
    /// History requests use the subject `history`.
    pub fn stall(&self, subject: &str) {
        self.stalled.lock().unwrap().insert(subject.to_string());
    }

    pub fn release(&self, subject: &str) {
        self.stalled.lock().unwrap().remove(subject);
        self.released.notify_waiters();
    }

    async fn hold(&self, subject: &str) {
        loop {
            let released = self.released.notified();
            if !self.stalled.lock().unwrap().contains(subject) {
                return;
            }
            released.await;
        }
    }

    fn record(&self, op: &str, subject: &str) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", op, subject));
        if let Some((trigger, gate)) = self.disconnect_on.lock().unwrap().as_ref() {
            if trigger == subject {
                gate.store(false, Ordering::SeqCst);
            }
        }
        match self.failures.lock().unwrap().get(subject) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl ChatApi for MockApi {
    fn create_channel(&self, channel: Channel) -> ApiFuture<'_, Channel> {
        Box::pin(async move {
            self.record("create_channel", &channel.cid)?;
            Ok(channel)
        })
    }

    fn send_message(&self, message: Message) -> ApiFuture<'_, Message> {
        Box::pin(async move {
            self.record("send_message", &message.id)?;
            self.hold(&message.id).await;
            Ok(message)
        })
    }

    fn update_message(&self, message: Message) -> ApiFuture<'_, Message> {
        Box::pin(async move {
            self.record("update_message", &message.id)?;
            Ok(message)
        })
    }

    fn delete_message(&self, message_id: String) -> ApiFuture<'_, Message> {
        Box::pin(async move {
            self.record("delete_message", &message_id)?;
            Ok(pending_message(&message_id, now()))
        })
    }

    fn delete_message_for_me(&self, message_id: String) -> ApiFuture<'_, Message> {
        Box::pin(async move {
            self.record("delete_message_for_me", &message_id)?;
            Ok(pending_message(&message_id, now()))
        })
    }

    fn send_reaction(&self, reaction: Reaction, enforce_unique: bool) -> ApiFuture<'_, Reaction> {
        Box::pin(async move {
            let op = if enforce_unique {
                "send_unique_reaction"
            } else {
                "send_reaction"
            };
            self.record(op, &reaction.id)?;
            Ok(reaction)
        })
    }

    fn delete_reaction(&self, message_id: String, reaction_type: String) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.record("delete_reaction", &format!("{}/{}", message_id, reaction_type))
        })
    }

    fn query_channels(&self, request: QueryChannelsRequest) -> ApiFuture<'_, Vec<Channel>> {
        Box::pin(async move {
            match request.filter {
                ChannelFilter::CidIn(cids) => {
                    self.record("query_channels", &cids.join(","))?;
                    let known = self.server_channels.lock().unwrap();
                    Ok(cids.iter().filter_map(|c| known.get(c).cloned()).collect())
                }
                ChannelFilter::Custom(_) => {
                    self.record("query_channels", "custom")?;
                    Ok(self.query_results.lock().unwrap().clone())
                }
            }
        })
    }

    fn watch_channel(&self, cid: String) -> ApiFuture<'_, Channel> {
        Box::pin(async move {
            self.record("watch_channel", &cid)?;
            Ok(Channel::new(cid))
        })
    }

    fn get_event_history_since(
        &self,
        cids: Vec<String>,
        since: SyncSince,
    ) -> ApiFuture<'_, Vec<ChatEvent>> {
        Box::pin(async move {
            self.history_requests
                .lock()
                .unwrap()
                .push((cids, since));
            self.record("history", "")?;
            self.hold("history").await;
            let next = self.history.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        })
    }
}

/// An orchestrator wired to in-memory collaborators.
pub struct Harness {
    pub orchestrator: SyncOrchestrator,
    pub api: Arc<MockApi>,
    pub store: Arc<SqliteStore>,
    pub gate: Arc<AtomicBool>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn save(&self, mutation: PendingMutation) {
        self.store.save_mutation(&mutation).unwrap();
    }

    pub fn status(&self, mutation: &PendingMutation) -> Option<SyncStatus> {
        self.store
            .load_mutation(mutation.kind(), mutation.id())
            .unwrap()
            .map(|m| m.sync_status())
    }

    pub fn stored_checkpoint(&self) -> Option<parley_core::SyncCheckpoint> {
        self.store.load_checkpoint(USER).unwrap()
    }
}

pub fn harness() -> Harness {
    let api = MockApi::new();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gate = Arc::new(AtomicBool::new(true));
    let clock = Arc::new(ManualClock::new(now()));
    let orchestrator = SyncOrchestrator::new(
        USER,
        api.clone(),
        store.clone(),
        gate.clone(),
        clock.clone(),
        SyncConfig::default(),
    );
    Harness {
        orchestrator,
        api,
        store,
        gate,
        clock,
    }
}
