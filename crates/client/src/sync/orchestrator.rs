// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline sync orchestrator.
//!
//! Reacts to socket lifecycle notifications:
//! - on connect: retry pending mutations, replay missed history, restore
//!   active channels
//! - on disconnect: persist the checkpoint and cancel the cycle's tasks
//!
//! Every public entry point logs and swallows its own failures. A failed
//! pass is simply retried on the next connect or health tick.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_core::{
    ChatEvent, Clock, ConnectedEvent, MarkAllReadEvent, Message, MutationKind, PendingMutation,
    Reaction, Store, SyncCheckpoint, SyncStatus,
};
use tokio::sync::{broadcast, watch};

use super::active::ActiveRegistry;
use super::scope::TaskScope;
use crate::commands::{ApiError, ChatApi, QueryChannelsRequest, SyncSince};
use crate::config::SyncSettings;
use crate::socket::{ConnectionSnapshot, DisconnectCause, SocketListener};

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pending mutations older than this are dropped instead of resent.
    pub max_threshold: chrono::Duration,
    /// Active queries re-run after a reconnect.
    pub queries_to_retry: usize,
    /// Missing active channels restored after a reconnect.
    pub channels_to_restore: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for SyncConfig {
    fn from(settings: &SyncSettings) -> Self {
        SyncConfig {
            max_threshold: settings.max_threshold(),
            queries_to_retry: settings.queries_to_retry,
            channels_to_restore: settings.channels_to_restore,
        }
    }
}

/// Error type for a single sync step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] parley_core::Error),

    #[error("api error: {0}")]
    Api(#[from] ApiError),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing,
}

/// Published to subscribers of [`SyncOrchestrator::subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Missed events, sorted by creation time. Sent once per sync pass.
    Events(Vec<ChatEvent>),
    ChannelsRestored(Vec<parley_core::Channel>),
}

/// Result of one history sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No channels to sync.
    Skipped,
    /// The fetch or a store write failed; checkpoint unchanged.
    Failed,
    /// Nothing new since the checkpoint.
    NoChanges,
    /// First sync for this user; checkpoint initialized.
    Initialized,
    /// Window too large; checkpoint jumped to now.
    TooManyEvents,
    /// Emitted this many events.
    Synced(usize),
}

/// Counts from one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub completed: usize,
    pub requeued: usize,
    pub failed: usize,
    /// Too old to resend; deleted locally.
    pub dropped: usize,
    /// The sweep stopped early because the connection went away.
    pub interrupted: bool,
}

/// Source of the "are we online" check between retried entities.
pub trait ConnectionGate: Send + Sync {
    fn is_connected(&self) -> bool;
}

impl ConnectionGate for watch::Receiver<ConnectionSnapshot> {
    fn is_connected(&self) -> bool {
        self.borrow().is_connected()
    }
}

impl ConnectionGate for AtomicBool {
    fn is_connected(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

struct Inner {
    user_id: String,
    api: Arc<dyn ChatApi>,
    store: Arc<dyn Store>,
    gate: Arc<dyn ConnectionGate>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    active: ActiveRegistry,
    checkpoint: Mutex<Option<SyncCheckpoint>>,
    phase: watch::Sender<SyncPhase>,
    /// Serializes history sync and retry sweeps.
    work: tokio::sync::Mutex<()>,
    scope: Mutex<Option<Arc<TaskScope>>>,
    first_connect: AtomicBool,
    cycles: AtomicUsize,
    updates: broadcast::Sender<SyncUpdate>,
}

/// Drives offline sync for one user. Cheap to clone.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(
        user_id: impl Into<String>,
        api: Arc<dyn ChatApi>,
        store: Arc<dyn Store>,
        gate: Arc<dyn ConnectionGate>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        let (updates, _) = broadcast::channel(64);
        SyncOrchestrator {
            inner: Arc::new(Inner {
                user_id: user_id.into(),
                api,
                store,
                gate,
                clock,
                config,
                active: ActiveRegistry::new(),
                checkpoint: Mutex::new(None),
                phase,
                work: tokio::sync::Mutex::new(()),
                scope: Mutex::new(None),
                first_connect: AtomicBool::new(true),
                cycles: AtomicUsize::new(0),
                updates,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn active(&self) -> &ActiveRegistry {
        &self.inner.active
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.inner.updates.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.borrow()
    }

    /// Completed connection cycles since construction.
    pub fn cycles(&self) -> usize {
        self.inner.cycles.load(Ordering::Acquire)
    }

    /// Waits until no sync cycle is running.
    pub async fn await_syncing(&self) {
        let mut rx = self.inner.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == SyncPhase::Idle).await;
    }

    /// Current checkpoint, loading it from the store on first use.
    pub fn checkpoint(&self) -> SyncResult<SyncCheckpoint> {
        let mut cached = self.lock_checkpoint();
        if let Some(checkpoint) = cached.as_ref() {
            return Ok(checkpoint.clone());
        }
        let loaded = self
            .inner
            .store
            .load_checkpoint(&self.inner.user_id)?
            .unwrap_or_else(|| SyncCheckpoint::new(self.inner.user_id.clone()));
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    fn lock_checkpoint(&self) -> std::sync::MutexGuard<'_, Option<SyncCheckpoint>> {
        match self.inner.checkpoint.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn save_checkpoint(&self, checkpoint: SyncCheckpoint) -> SyncResult<()> {
        self.inner.store.save_checkpoint(&checkpoint)?;
        *self.lock_checkpoint() = Some(checkpoint);
        Ok(())
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.inner.phase.send_replace(phase);
    }

    /// Replaces the cycle scope and runs the connected cycle inside it.
    pub fn on_connected(&self) {
        let scope = Arc::new(TaskScope::new());
        if let Ok(mut current) = self.inner.scope.lock() {
            if let Some(old) = current.replace(Arc::clone(&scope)) {
                old.cancel();
            }
        }
        self.set_phase(SyncPhase::Syncing);
        let this = self.clone();
        if !scope.spawn(async move { this.handle_connected().await }) {
            self.set_phase(SyncPhase::Idle);
        }
    }

    /// Persists the checkpoint and cancels the current cycle.
    pub fn on_disconnected(&self) {
        if let Err(e) = self.persist_active_channels() {
            tracing::warn!("failed to save sync checkpoint on disconnect: {}", e);
        }
        let scope = self.inner.scope.lock().ok().and_then(|mut s| s.take());
        if let Some(scope) = scope {
            scope.cancel();
        }
        // A sweep aborted mid-request still holds the lock until its task
        // is dropped; the next sweep requeues in that case.
        if let Ok(_guard) = self.inner.work.try_lock() {
            self.requeue_interrupted();
        }
        self.set_phase(SyncPhase::Idle);
    }

    /// Moves mutations left `InProgress` by a cancelled sweep back to
    /// `SyncNeeded`. Callers must hold the work lock.
    fn requeue_interrupted(&self) -> usize {
        let store = &self.inner.store;
        let mut requeued = 0;
        for kind in MutationKind::RETRY_ORDER {
            let ids = match store.list_pending_mutations(kind, SyncStatus::InProgress) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(%kind, "failed to list interrupted mutations: {}", e);
                    continue;
                }
            };
            for id in ids {
                match store.mark_mutation_status(kind, &id, SyncStatus::SyncNeeded) {
                    Ok(()) => requeued += 1,
                    Err(e) => tracing::warn!(%kind, %id, "failed to requeue mutation: {}", e),
                }
            }
        }
        if requeued > 0 {
            tracing::info!(requeued, "requeued interrupted mutations");
        }
        requeued
    }

    /// Reacts to a live event.
    pub fn on_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::Health(_) => {
                let this = self.clone();
                self.spawn_in_cycle(async move {
                    this.retry_failed_entities().await;
                });
            }
            ChatEvent::MarkAllRead(e) => {
                self.handle_mark_all_read(e);
            }
            _ => {}
        }
    }

    fn spawn_in_cycle<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let scope = self.inner.scope.lock().ok().and_then(|s| s.clone());
        match scope {
            Some(scope) => {
                if !scope.spawn(task) {
                    tracing::debug!("connection cycle cancelled, skipping task");
                }
            }
            None => tracing::debug!("no active connection cycle, skipping task"),
        }
    }

    /// One full connected cycle: retry, mark read, sync, restore.
    pub async fn handle_connected(&self) {
        self.set_phase(SyncPhase::Syncing);
        let first_connect = self.inner.first_connect.swap(false, Ordering::AcqRel);
        tracing::info!(user = %self.inner.user_id, first_connect, "starting sync cycle");

        let report = self.retry_failed_entities().await;
        tracing::debug!(?report, "retry sweep finished");

        if let Err(e) = self.mark_all_read_on_connect(first_connect) {
            tracing::warn!("failed to update read state: {}", e);
        }

        let outcome = self.sync().await;
        tracing::debug!(?outcome, "history sync finished");

        if let Err(e) = self.restore_active_channels(!first_connect).await {
            tracing::warn!("failed to restore active channels: {}", e);
        }

        self.inner.cycles.fetch_add(1, Ordering::AcqRel);
        self.set_phase(SyncPhase::Idle);
    }

    fn mark_all_read_on_connect(&self, first_connect: bool) -> SyncResult<()> {
        let stored = self.inner.store.load_checkpoint(&self.inner.user_id)?;
        if !first_connect && stored.is_some() {
            return Ok(());
        }
        let mut checkpoint = self.checkpoint()?;
        if checkpoint.mark_all_read(self.inner.clock.now()) {
            self.save_checkpoint(checkpoint)?;
        }
        Ok(())
    }

    /// Records a live mark-all-read for this user. Other users are ignored.
    pub fn handle_mark_all_read(&self, event: &MarkAllReadEvent) -> bool {
        if event.user.id != self.inner.user_id {
            tracing::debug!(user = %event.user.id, "ignoring mark-all-read for another user");
            return false;
        }
        let result = self.checkpoint().and_then(|mut checkpoint| {
            if checkpoint.mark_all_read(event.created_at) {
                self.save_checkpoint(checkpoint)?;
                Ok(true)
            } else {
                Ok(false)
            }
        });
        match result {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!("failed to record mark-all-read: {}", e);
                false
            }
        }
    }

    fn persist_active_channels(&self) -> SyncResult<()> {
        let active = self.inner.active.channel_ids();
        let mut checkpoint = self.checkpoint()?;
        if !active.is_empty() {
            checkpoint = checkpoint.with_active_channels(active);
        }
        self.save_checkpoint(checkpoint)
    }

    /// Replays missed history once. Serialized with retry sweeps.
    pub async fn sync(&self) -> SyncOutcome {
        let _guard = self.inner.work.lock().await;
        match self.perform_sync().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("sync pass failed: {}", e);
                SyncOutcome::Failed
            }
        }
    }

    async fn perform_sync(&self) -> SyncResult<SyncOutcome> {
        let mut checkpoint = self.checkpoint()?;
        let mut cids = self.inner.active.channel_ids();
        if cids.is_empty() {
            cids = checkpoint.active_channel_ids.iter().cloned().collect();
        }
        if cids.is_empty() {
            tracing::debug!("no channels to sync");
            return Ok(SyncOutcome::Skipped);
        }

        let started = self.inner.clock.now();
        let since = SyncSince::from_checkpoint(&checkpoint)
            .unwrap_or(SyncSince::Timestamp(started));
        tracing::info!(channels = cids.len(), ?since, "fetching event history");

        let mut events = match self.inner.api.get_event_history_since(cids, since).await {
            Ok(events) => events,
            Err(ApiError::TooManyEventsToSync) => {
                tracing::warn!("too many events to sync, skipping ahead");
                checkpoint.advance(self.inner.clock.now(), None);
                self.save_checkpoint(checkpoint)?;
                return Ok(SyncOutcome::TooManyEvents);
            }
            Err(e) => return Err(e.into()),
        };

        if events.is_empty() {
            if checkpoint.last_synced_at.is_none() {
                checkpoint.advance(started, None);
                self.save_checkpoint(checkpoint)?;
                return Ok(SyncOutcome::Initialized);
            }
            return Ok(SyncOutcome::NoChanges);
        }

        events.sort_by_key(|e| e.created_at().unwrap_or(DateTime::<Utc>::MIN_UTC));
        let latest = events
            .last()
            .and_then(|e| e.created_at().map(|at| (at, e.raw_created_at().map(str::to_string))));
        if let Some((at, raw)) = &latest {
            if checkpoint.is_at(raw.as_deref(), *at) {
                tracing::debug!("history already applied");
                return Ok(SyncOutcome::NoChanges);
            }
        }

        for event in &events {
            if let ChatEvent::MarkAllRead(e) = event {
                if e.user.id == self.inner.user_id {
                    checkpoint.mark_all_read(e.created_at);
                }
            }
        }

        let count = events.len();
        if self.inner.updates.send(SyncUpdate::Events(events)).is_err() {
            tracing::debug!("no sync subscribers");
        }
        if let Some((at, raw)) = latest {
            checkpoint.advance(at, raw);
        }
        self.save_checkpoint(checkpoint)?;
        tracing::info!(count, "synced missed events");
        Ok(SyncOutcome::Synced(count))
    }

    /// Resubmits pending mutations: channels, then messages, then reactions.
    pub async fn retry_failed_entities(&self) -> RetryReport {
        let _guard = self.inner.work.lock().await;
        self.requeue_interrupted();
        let mut report = RetryReport::default();
        if let Err(e) = self.retry_all(&mut report).await {
            tracing::warn!("retry sweep aborted: {}", e);
        }
        report
    }

    async fn retry_all(&self, report: &mut RetryReport) -> SyncResult<()> {
        let threshold = self.inner.clock.now() - self.inner.config.max_threshold;
        let passes = [
            (MutationKind::Channel, SyncStatus::SyncNeeded),
            (MutationKind::Message, SyncStatus::SyncNeeded),
            (MutationKind::Message, SyncStatus::AwaitingAttachments),
            (MutationKind::Reaction, SyncStatus::SyncNeeded),
        ];

        for (kind, status) in passes {
            for id in self.inner.store.list_pending_mutations(kind, status)? {
                if !self.inner.gate.is_connected() {
                    tracing::info!("connection lost, stopping retry sweep");
                    report.interrupted = true;
                    return Ok(());
                }
                let Some(mutation) = self.inner.store.load_mutation(kind, &id)? else {
                    continue;
                };

                if mutation.local_timestamp().is_some_and(|at| at < threshold) {
                    tracing::info!(%kind, %id, "dropping stale pending mutation");
                    self.inner.store.delete_mutation(kind, &id)?;
                    report.dropped += 1;
                    continue;
                }

                match self.retry_one(mutation).await {
                    Ok(SyncStatus::Completed) => report.completed += 1,
                    Ok(SyncStatus::FailedPermanently) => report.failed += 1,
                    Ok(_) => report.requeued += 1,
                    Err(e) => {
                        tracing::warn!(%kind, %id, "retry failed: {}", e);
                        report.requeued += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn retry_one(&self, mutation: PendingMutation) -> SyncResult<SyncStatus> {
        let kind = mutation.kind();
        let id = mutation.id().to_string();

        if let PendingMutation::Message(message) = &mutation {
            if message.sync_status == SyncStatus::AwaitingAttachments
                && message.has_failed_attachment()
            {
                tracing::info!(%id, "attachment upload failed, giving up on message");
                self.inner
                    .store
                    .mark_mutation_status(kind, &id, SyncStatus::FailedPermanently)?;
                return Ok(SyncStatus::FailedPermanently);
            }
        }

        self.inner
            .store
            .mark_mutation_status(kind, &id, SyncStatus::InProgress)?;
        let result = match mutation {
            PendingMutation::Channel(channel) => {
                self.inner.api.create_channel(channel).await.map(|_| ())
            }
            PendingMutation::Message(message) => self.retry_message(message).await,
            PendingMutation::Reaction(reaction) => self.retry_reaction(reaction).await,
        };

        let status = match &result {
            Ok(()) => SyncStatus::Completed,
            Err(e) if e.is_permanent() => SyncStatus::FailedPermanently,
            Err(_) => SyncStatus::SyncNeeded,
        };
        if let Err(e) = &result {
            tracing::debug!(%kind, %id, ?status, "retry rejected: {}", e);
        }
        self.inner.store.mark_mutation_status(kind, &id, status)?;
        Ok(status)
    }

    async fn retry_message(&self, message: Message) -> Result<(), ApiError> {
        let api = &self.inner.api;
        if message.deleted_at.is_some() {
            api.delete_message(message.id).await.map(|_| ())
        } else if message.deleted_for_me {
            api.delete_message_for_me(message.id).await.map(|_| ())
        } else if message.updated_locally_at.is_some() {
            api.update_message(message).await.map(|_| ())
        } else {
            api.send_message(message).await.map(|_| ())
        }
    }

    async fn retry_reaction(&self, reaction: Reaction) -> Result<(), ApiError> {
        let api = &self.inner.api;
        if reaction.deleted_at.is_some() {
            api.delete_reaction(reaction.message_id, reaction.kind).await
        } else {
            let enforce_unique = reaction.enforce_unique;
            api.send_reaction(reaction, enforce_unique).await.map(|_| ())
        }
    }

    /// Re-runs active queries, then fetches or re-watches missing channels.
    pub async fn restore_active_channels(&self, recover_all: bool) -> SyncResult<()> {
        let config = &self.inner.config;
        let active = &self.inner.active;
        let mut covered = BTreeSet::new();
        let mut restored = Vec::new();

        for query in active
            .queries_for_recovery(recover_all)
            .into_iter()
            .take(config.queries_to_retry)
        {
            match self.inner.api.query_channels(query.first_page()).await {
                Ok(channels) => {
                    for channel in channels {
                        covered.insert(channel.cid.clone());
                        restored.push(channel);
                    }
                }
                Err(e) => tracing::warn!("failed to re-run active query: {}", e),
            }
        }

        let missing: Vec<String> = active
            .channels_for_recovery(recover_all)
            .into_iter()
            .filter(|cid| !covered.contains(cid))
            .take(config.channels_to_restore)
            .collect();

        if !missing.is_empty() {
            tracing::info!(count = missing.len(), "restoring active channels");
            match self
                .inner
                .api
                .query_channels(QueryChannelsRequest::for_cids(missing.clone()))
                .await
            {
                Ok(channels) => {
                    for channel in channels {
                        covered.insert(channel.cid.clone());
                        restored.push(channel);
                    }
                }
                Err(e) => tracing::warn!("failed to query missing channels: {}", e),
            }

            // Still watched even if the server no longer lists them.
            for cid in missing.into_iter().filter(|cid| !covered.contains(cid)) {
                match self.inner.api.watch_channel(cid.clone()).await {
                    Ok(channel) => restored.push(channel),
                    Err(e) => tracing::warn!(%cid, "failed to re-watch channel: {}", e),
                }
            }
        }

        active.clear_recovery_flags();
        if !restored.is_empty() {
            let _ = self
                .inner
                .updates
                .send(SyncUpdate::ChannelsRestored(restored));
        }
        Ok(())
    }
}

impl SocketListener for SyncOrchestrator {
    fn on_connected(&self, _ack: &ConnectedEvent) {
        SyncOrchestrator::on_connected(self);
    }

    fn on_disconnected(&self, _cause: &DisconnectCause) {
        SyncOrchestrator::on_disconnected(self);
    }

    fn on_event(&self, event: &ChatEvent) {
        SyncOrchestrator::on_event(self, event);
    }
}
