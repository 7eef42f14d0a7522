// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::orchestrator::{SyncOutcome, SyncPhase, SyncUpdate};
use super::test_helpers::*;
use crate::commands::{ApiError, ChannelFilter, QueryChannelsRequest, SyncSince};
use parley_core::{
    ChatEvent, HealthEvent, PendingMutation, Store, SyncCheckpoint, SyncStatus,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use yare::parameterized;

/// Polls until the mock has seen `call`.
async fn called(h: &Harness, call: &str) {
    for _ in 0..200 {
        if h.api.calls().iter().any(|c| c == call) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("never called {}", call);
}

fn sends(h: &Harness, id: &str) -> usize {
    let call = format!("send_message:{}", id);
    h.api.calls().iter().filter(|c| **c == call).count()
}

fn checkpoint_at(secs: i64) -> SyncCheckpoint {
    let mut checkpoint = SyncCheckpoint::new(USER);
    checkpoint.advance(t(secs), Some(t(secs).to_rfc3339()));
    checkpoint
}

// History sync

#[tokio::test]
async fn sync_emits_one_sorted_batch_and_advances() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(100)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);
    h.api.queue_history(Ok(vec![
        message_event("m2", t(300)),
        message_event("m3", t(400)),
        message_event("m1", t(200)),
    ]));
    let mut updates = h.orchestrator.subscribe();

    assert_eq!(h.orchestrator.sync().await, SyncOutcome::Synced(3));

    match updates.try_recv().unwrap() {
        SyncUpdate::Events(events) => {
            let times: Vec<_> = events.iter().map(|e| e.created_at().unwrap()).collect();
            assert_eq!(times, vec![t(200), t(300), t(400)]);
        }
        other => panic!("expected events, got {:?}", other),
    }
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

    let stored = h.stored_checkpoint().unwrap();
    assert_eq!(stored.last_synced_at, Some(t(400)));
    assert_eq!(stored.last_synced_raw, Some(t(400).to_rfc3339()));
    assert_eq!(
        h.api.history_requests()[0].1,
        SyncSince::Raw(t(100).to_rfc3339())
    );
}

#[tokio::test]
async fn sync_twice_with_no_new_events_is_idempotent() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(100)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);
    let batch = vec![message_event("m1", t(200)), message_event("m2", t(300))];
    h.api.queue_history(Ok(batch.clone()));
    h.api.queue_history(Ok(batch));
    let mut updates = h.orchestrator.subscribe();

    assert_eq!(h.orchestrator.sync().await, SyncOutcome::Synced(2));
    let after_first = h.stored_checkpoint();
    assert_eq!(h.orchestrator.sync().await, SyncOutcome::NoChanges);

    assert_eq!(h.stored_checkpoint(), after_first);
    assert!(updates.try_recv().is_ok());
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn failed_fetch_leaves_checkpoint_alone() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(100)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);
    h.api.queue_history(Err(server_error(500)));

    assert_eq!(h.orchestrator.sync().await, SyncOutcome::Failed);
    assert_eq!(h.stored_checkpoint(), Some(checkpoint_at(100)));
}

#[tokio::test]
async fn too_many_events_skips_to_now() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(100)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);
    h.api.queue_history(Err(ApiError::TooManyEventsToSync));
    let mut updates = h.orchestrator.subscribe();

    assert_eq!(h.orchestrator.sync().await, SyncOutcome::TooManyEvents);
    let stored = h.stored_checkpoint().unwrap();
    assert_eq!(stored.last_synced_at, Some(now()));
    assert_eq!(stored.last_synced_raw, None);
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn first_empty_sync_initializes_checkpoint_once() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:general", false);

    assert_eq!(h.orchestrator.sync().await, SyncOutcome::Initialized);
    assert_eq!(h.api.history_requests()[0].1, SyncSince::Timestamp(now()));
    assert_eq!(h.stored_checkpoint().unwrap().last_synced_at, Some(now()));

    h.clock.set(t(20_000));
    assert_eq!(h.orchestrator.sync().await, SyncOutcome::NoChanges);
    assert_eq!(h.stored_checkpoint().unwrap().last_synced_at, Some(now()));
}

#[tokio::test]
async fn sync_without_channels_is_skipped() {
    let h = harness();
    assert_eq!(h.orchestrator.sync().await, SyncOutcome::Skipped);
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn sync_falls_back_to_persisted_channels() {
    let h = harness();
    let checkpoint =
        checkpoint_at(100).with_active_channels(vec!["messaging:a".to_string(), "messaging:b".to_string()]);
    h.store.save_checkpoint(&checkpoint).unwrap();

    h.orchestrator.sync().await;
    assert_eq!(
        h.api.history_requests()[0].0,
        vec!["messaging:a".to_string(), "messaging:b".to_string()]
    );
}

#[tokio::test]
async fn older_history_never_moves_checkpoint_back() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(500)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);

    for batch in [vec![t(300)], vec![t(600), t(450)], vec![t(550)], vec![t(900)]] {
        h.api.queue_history(Ok(batch
            .iter()
            .enumerate()
            .map(|(i, at)| message_event(&format!("m{}", i), *at))
            .collect()));
        let before = h.stored_checkpoint().unwrap().last_synced_at;
        h.orchestrator.sync().await;
        let after = h.stored_checkpoint().unwrap().last_synced_at;
        assert!(after >= before);
    }
    assert_eq!(h.stored_checkpoint().unwrap().last_synced_at, Some(t(900)));
}

#[tokio::test]
async fn synced_mark_all_read_updates_checkpoint() {
    let h = harness();
    h.store.save_checkpoint(&checkpoint_at(100)).unwrap();
    h.orchestrator.active().track_channel("messaging:general", false);
    h.api.queue_history(Ok(vec![
        message_event("m1", t(200)),
        ChatEvent::MarkAllRead(mark_all_read_event(USER, t(250))),
        ChatEvent::MarkAllRead(mark_all_read_event("bob", t(280))),
    ]));

    h.orchestrator.sync().await;
    assert_eq!(
        h.stored_checkpoint().unwrap().marked_all_read_at,
        Some(t(250))
    );
}

// Live events

#[tokio::test]
async fn live_mark_all_read_only_for_current_user() {
    let h = harness();
    assert!(!h
        .orchestrator
        .handle_mark_all_read(&mark_all_read_event("bob", t(100))));
    assert!(h.stored_checkpoint().is_none());

    assert!(h
        .orchestrator
        .handle_mark_all_read(&mark_all_read_event(USER, t(100))));
    assert!(!h
        .orchestrator
        .handle_mark_all_read(&mark_all_read_event(USER, t(50))));
    assert_eq!(
        h.stored_checkpoint().unwrap().marked_all_read_at,
        Some(t(100))
    );
}

#[tokio::test]
async fn health_event_triggers_retry_sweep() {
    let h = harness();
    let message = PendingMutation::Message(pending_message("m1", now()));
    h.save(message.clone());

    h.orchestrator.on_connected();
    h.orchestrator.await_syncing().await;
    h.save(PendingMutation::Message(pending_message("m2", now())));

    h.orchestrator.on_event(&ChatEvent::Health(HealthEvent {
        connection_id: "c1".to_string(),
        created_at: now(),
        raw_created_at: None,
    }));
    let m2 = PendingMutation::Message(pending_message("m2", now()));
    for _ in 0..200 {
        if h.status(&m2) == Some(SyncStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.status(&message), Some(SyncStatus::Completed));
    assert_eq!(h.status(&m2), Some(SyncStatus::Completed));
}

// Retry sweep

#[tokio::test]
async fn retries_channels_then_messages_then_reactions() {
    let h = harness();
    let reaction = PendingMutation::Reaction(pending_reaction("r1", "m1", now()));
    let message = PendingMutation::Message(pending_message("m1", now()));
    let channel = PendingMutation::Channel(pending_channel("messaging:new", now()));
    h.save(reaction.clone());
    h.save(message.clone());
    h.save(channel.clone());

    let report = h.orchestrator.retry_failed_entities().await;

    assert_eq!(
        h.api.calls(),
        vec![
            "create_channel:messaging:new",
            "send_message:m1",
            "send_reaction:r1"
        ]
    );
    assert_eq!(report.completed, 3);
    for mutation in [&reaction, &message, &channel] {
        assert_eq!(h.status(mutation), Some(SyncStatus::Completed));
    }
}

#[tokio::test]
async fn failed_attachment_fails_message_without_sending() {
    let h = harness();
    let mut message = pending_message("m1", now());
    message.sync_status = SyncStatus::AwaitingAttachments;
    message.attachments.push(failed_attachment());
    let message = PendingMutation::Message(message);
    h.save(message.clone());

    let report = h.orchestrator.retry_failed_entities().await;

    assert_eq!(h.status(&message), Some(SyncStatus::FailedPermanently));
    assert_eq!(report.failed, 1);
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn awaiting_attachments_without_failure_is_sent() {
    let h = harness();
    let mut message = pending_message("m1", now());
    message.sync_status = SyncStatus::AwaitingAttachments;
    let message = PendingMutation::Message(message);
    h.save(message.clone());

    h.orchestrator.retry_failed_entities().await;
    assert_eq!(h.api.calls(), vec!["send_message:m1"]);
    assert_eq!(h.status(&message), Some(SyncStatus::Completed));
}

#[parameterized(
    client_error = { 400, SyncStatus::FailedPermanently },
    rate_limited = { 429, SyncStatus::SyncNeeded },
    server_unavailable = { 503, SyncStatus::SyncNeeded },
)]
fn rejected_retry_status(status_code: i32, expected: SyncStatus) {
    tokio::runtime::Runtime::new().unwrap().block_on(async {
        let h = harness();
        let message = PendingMutation::Message(pending_message("m1", now()));
        h.save(message.clone());
        h.api.fail("m1", server_error(status_code));

        h.orchestrator.retry_failed_entities().await;
        assert_eq!(h.status(&message), Some(expected));
    });
}

#[tokio::test]
async fn one_failure_does_not_stop_the_sweep() {
    let h = harness();
    let first = PendingMutation::Message(pending_message("m1", now()));
    let second = PendingMutation::Message(pending_message("m2", now()));
    h.save(first.clone());
    h.save(second.clone());
    h.api.fail("m1", server_error(500));

    let report = h.orchestrator.retry_failed_entities().await;
    assert_eq!(report.requeued, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(h.status(&second), Some(SyncStatus::Completed));
}

#[tokio::test]
async fn stale_mutations_are_dropped() {
    let h = harness();
    let stale = PendingMutation::Message(pending_message("old", now() - chrono::Duration::hours(13)));
    let fresh = PendingMutation::Message(pending_message("new", now() - chrono::Duration::hours(11)));
    h.save(stale.clone());
    h.save(fresh.clone());

    let report = h.orchestrator.retry_failed_entities().await;

    assert_eq!(report.dropped, 1);
    assert_eq!(h.status(&stale), None);
    assert_eq!(h.status(&fresh), Some(SyncStatus::Completed));
    assert_eq!(h.api.calls(), vec!["send_message:new"]);
}

#[parameterized(
    deleted = { "deleted", "delete_message:m1" },
    deleted_for_me = { "deleted_for_me", "delete_message_for_me:m1" },
    updated = { "updated", "update_message:m1" },
    new = { "new", "send_message:m1" },
)]
fn message_retry_picks_command(shape: &str, expected_call: &str) {
    tokio::runtime::Runtime::new().unwrap().block_on(async {
        let h = harness();
        let mut message = pending_message("m1", now());
        match shape {
            "deleted" => message.deleted_at = Some(now()),
            "deleted_for_me" => message.deleted_for_me = true,
            "updated" => message.updated_locally_at = Some(now()),
            _ => {}
        }
        h.save(PendingMutation::Message(message));

        h.orchestrator.retry_failed_entities().await;
        assert_eq!(h.api.calls(), vec![expected_call.to_string()]);
    });
}

#[tokio::test]
async fn reaction_retry_honors_delete_and_uniqueness() {
    let h = harness();
    let mut deleted = pending_reaction("r1", "m1", now());
    deleted.deleted_at = Some(now());
    let mut unique = pending_reaction("r2", "m2", now());
    unique.enforce_unique = true;
    h.save(PendingMutation::Reaction(deleted));
    h.save(PendingMutation::Reaction(unique));

    h.orchestrator.retry_failed_entities().await;
    assert_eq!(
        h.api.calls(),
        vec!["delete_reaction:m1/like", "send_unique_reaction:r2"]
    );
}

#[tokio::test]
async fn sweep_stops_when_offline() {
    let h = harness();
    h.gate.store(false, Ordering::SeqCst);
    h.save(PendingMutation::Message(pending_message("m1", now())));

    let report = h.orchestrator.retry_failed_entities().await;
    assert!(report.interrupted);
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn sweep_stops_when_connection_drops_midway() {
    let h = harness();
    let first = PendingMutation::Message(pending_message("m1", now()));
    let second = PendingMutation::Message(pending_message("m2", now()));
    h.save(first.clone());
    h.save(second.clone());
    h.api.disconnect_on("m1", h.gate.clone());

    let report = h.orchestrator.retry_failed_entities().await;

    assert!(report.interrupted);
    assert_eq!(h.api.calls(), vec!["send_message:m1"]);
    assert_eq!(h.status(&first), Some(SyncStatus::Completed));
    assert_eq!(h.status(&second), Some(SyncStatus::SyncNeeded));
}

// Restore

#[tokio::test]
async fn restore_reruns_queries_then_fills_gaps() {
    let h = harness();
    let active = h.orchestrator.active();
    active.track_query(
        QueryChannelsRequest::new(ChannelFilter::Custom(serde_json::json!({"members": ["alice"]}))),
        false,
    );
    for cid in ["messaging:a", "messaging:b", "messaging:c", "messaging:d"] {
        active.track_channel(cid, false);
    }
    h.api.set_query_results(&["messaging:a", "messaging:b"]);
    h.api.add_server_channel("messaging:c");
    let mut updates = h.orchestrator.subscribe();

    h.orchestrator.restore_active_channels(true).await.unwrap();

    assert_eq!(
        h.api.calls(),
        vec![
            "query_channels:custom",
            "query_channels:messaging:c,messaging:d",
            "watch_channel:messaging:d",
        ]
    );
    match updates.try_recv().unwrap() {
        SyncUpdate::ChannelsRestored(channels) => {
            let cids: Vec<_> = channels.iter().map(|c| c.cid.as_str()).collect();
            assert_eq!(
                cids,
                vec!["messaging:a", "messaging:b", "messaging:c", "messaging:d"]
            );
        }
        other => panic!("expected restored channels, got {:?}", other),
    }
}

#[tokio::test]
async fn restore_caps_queries() {
    let h = harness();
    for i in 0..5 {
        h.orchestrator.active().track_query(
            QueryChannelsRequest::new(ChannelFilter::Custom(serde_json::json!({ "page": i }))),
            false,
        );
    }

    h.orchestrator.restore_active_channels(true).await.unwrap();
    assert_eq!(h.api.calls().len(), 3);
}

#[tokio::test]
async fn first_connect_restores_only_flagged_channels() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:quiet", false);
    h.orchestrator.active().track_channel("messaging:broken", true);
    h.api.add_server_channel("messaging:quiet");
    h.api.add_server_channel("messaging:broken");

    h.orchestrator.handle_connected().await;
    assert!(h
        .api
        .calls()
        .contains(&"query_channels:messaging:broken".to_string()));

    h.orchestrator.handle_connected().await;
    assert!(h
        .api
        .calls()
        .contains(&"query_channels:messaging:broken,messaging:quiet".to_string()));
    assert_eq!(h.orchestrator.cycles(), 2);
}

// Lifecycle

#[tokio::test]
async fn first_connect_marks_all_read_once() {
    let h = harness();
    h.orchestrator.handle_connected().await;
    assert_eq!(
        h.stored_checkpoint().unwrap().marked_all_read_at,
        Some(now())
    );

    h.clock.set(t(20_000));
    h.orchestrator.handle_connected().await;
    assert_eq!(
        h.stored_checkpoint().unwrap().marked_all_read_at,
        Some(now())
    );
}

#[tokio::test]
async fn disconnect_persists_active_channels() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:a", false);
    h.orchestrator.active().track_channel("messaging:b", true);

    h.orchestrator.on_disconnected();

    let stored = h.stored_checkpoint().unwrap();
    let ids: Vec<_> = stored.active_channel_ids.into_iter().collect();
    assert_eq!(ids, vec!["messaging:a", "messaging:b"]);
    assert_eq!(h.orchestrator.phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn disconnect_cancels_running_cycle() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:a", false);
    h.api.stall("history");

    h.orchestrator.on_connected();
    for _ in 0..200 {
        if !h.api.history_requests().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.orchestrator.phase(), SyncPhase::Syncing);

    h.orchestrator.on_disconnected();
    tokio::time::timeout(Duration::from_secs(1), h.orchestrator.await_syncing())
        .await
        .unwrap();
    assert_eq!(h.orchestrator.cycles(), 0);

    // The work lock was released with the aborted task.
    let report = tokio::time::timeout(
        Duration::from_secs(1),
        h.orchestrator.retry_failed_entities(),
    )
    .await
    .unwrap();
    assert!(!report.interrupted);
}

#[tokio::test]
async fn await_syncing_waits_for_cycle_started_by_connect() {
    let h = harness();
    h.orchestrator.on_connected();
    assert_eq!(h.orchestrator.phase(), SyncPhase::Syncing);

    tokio::time::timeout(Duration::from_secs(1), h.orchestrator.await_syncing())
        .await
        .unwrap();
    assert_eq!(h.orchestrator.cycles(), 1);
    assert_eq!(h.orchestrator.phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn disconnect_mid_retry_requeues_mutation() {
    let h = harness();
    let message = PendingMutation::Message(pending_message("m1", now()));
    h.save(message.clone());
    h.api.stall("m1");

    h.orchestrator.on_connected();
    called(&h, "send_message:m1").await;
    assert_eq!(h.status(&message), Some(SyncStatus::InProgress));

    h.orchestrator.on_disconnected();
    h.api.release("m1");
    let report = tokio::time::timeout(
        Duration::from_secs(1),
        h.orchestrator.retry_failed_entities(),
    )
    .await
    .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(h.status(&message), Some(SyncStatus::Completed));
    assert_eq!(sends(&h, "m1"), 2);
}

#[tokio::test]
async fn idle_disconnect_requeues_in_progress_mutations() {
    let h = harness();
    let mut message = pending_message("m1", now());
    message.sync_status = SyncStatus::InProgress;
    let message = PendingMutation::Message(message);
    h.save(message.clone());
    let mut reaction = pending_reaction("r1", "m0", now());
    reaction.sync_status = SyncStatus::InProgress;
    let reaction = PendingMutation::Reaction(reaction);
    h.save(reaction.clone());

    h.orchestrator.on_disconnected();

    assert_eq!(h.status(&message), Some(SyncStatus::SyncNeeded));
    assert_eq!(h.status(&reaction), Some(SyncStatus::SyncNeeded));
}

#[tokio::test]
async fn retry_sweep_resends_mutation_left_in_progress() {
    let h = harness();
    let mut message = pending_message("m1", now());
    message.sync_status = SyncStatus::InProgress;
    let message = PendingMutation::Message(message);
    h.save(message.clone());

    let report = h.orchestrator.retry_failed_entities().await;

    assert_eq!(report.completed, 1);
    assert_eq!(h.status(&message), Some(SyncStatus::Completed));
    assert_eq!(sends(&h, "m1"), 1);
}

// Serialization

#[tokio::test]
async fn retry_sweep_waits_for_running_sync() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:general", false);
    let message = PendingMutation::Message(pending_message("m1", now()));
    h.save(message.clone());
    h.api.stall("history");

    let orchestrator = h.orchestrator.clone();
    let syncing = tokio::spawn(async move { orchestrator.sync().await });
    called(&h, "history:").await;

    let orchestrator = h.orchestrator.clone();
    let retrying = tokio::spawn(async move { orchestrator.retry_failed_entities().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sends(&h, "m1"), 0);
    assert_eq!(h.status(&message), Some(SyncStatus::SyncNeeded));

    h.api.release("history");
    let outcome = tokio::time::timeout(Duration::from_secs(1), syncing)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Initialized);
    let report = tokio::time::timeout(Duration::from_secs(1), retrying)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(sends(&h, "m1"), 1);
}

#[tokio::test]
async fn sync_waits_for_running_retry_sweep() {
    let h = harness();
    h.orchestrator.active().track_channel("messaging:general", false);
    h.save(PendingMutation::Message(pending_message("m1", now())));
    h.api.stall("m1");

    let orchestrator = h.orchestrator.clone();
    let retrying = tokio::spawn(async move { orchestrator.retry_failed_entities().await });
    called(&h, "send_message:m1").await;

    let orchestrator = h.orchestrator.clone();
    let syncing = tokio::spawn(async move { orchestrator.sync().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.api.history_requests().is_empty());

    h.api.release("m1");
    tokio::time::timeout(Duration::from_secs(1), retrying)
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), syncing)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.api.history_requests().len(), 1);
}
