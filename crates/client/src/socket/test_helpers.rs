// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for socket module tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChatError, ChatEvent, ConnectedEvent, User};
use tokio::sync::mpsc;

use super::listener::{Notification, SocketListener};
use super::machine::SocketSettings;
use super::state::DisconnectCause;

/// Connection ack frame as the server sends it.
pub fn ack_frame(connection_id: &str, user_id: &str) -> String {
    serde_json::json!({
        "type": "connection.ok",
        "connection_id": connection_id,
        "me": { "id": user_id },
        "created_at": "2026-01-01T00:00:00Z",
    })
    .to_string()
}

/// A `typing.start` frame for `cid`.
pub fn typing_frame(cid: &str, user_id: &str) -> String {
    serde_json::json!({
        "type": "typing.start",
        "cid": cid,
        "user": { "id": user_id },
        "created_at": "2026-01-01T00:00:05Z",
    })
    .to_string()
}

/// Server error envelope frame.
pub fn error_frame(code: i32, status_code: i32) -> String {
    serde_json::json!({
        "error": {
            "code": code,
            "message": "rejected",
            "StatusCode": status_code,
        }
    })
    .to_string()
}

/// Settings with long health interval and no backoff delay.
pub fn settings() -> SocketSettings {
    SocketSettings {
        endpoint: "ws://chat.example.com/connect".to_string(),
        api_key: "key-1".to_string(),
        retry_limit: 3,
        base_delay: Duration::from_millis(10),
        health_check_interval: Duration::from_secs(60),
        connect_timeout: Duration::from_secs(5),
    }
}

pub fn alice() -> User {
    User::new("alice")
}

/// Listener that forwards every notification to a channel.
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingListener { tx }), rx)
    }
}

impl SocketListener for RecordingListener {
    fn on_connecting(&self) {
        let _ = self.tx.send(Notification::Connecting);
    }

    fn on_connected(&self, ack: &ConnectedEvent) {
        let _ = self.tx.send(Notification::Connected(ack.clone()));
    }

    fn on_disconnected(&self, cause: &DisconnectCause) {
        let _ = self.tx.send(Notification::Disconnected(cause.clone()));
    }

    fn on_event(&self, event: &ChatEvent) {
        let _ = self.tx.send(Notification::Event(event.clone()));
    }

    fn on_error(&self, error: &ChatError) {
        let _ = self.tx.send(Notification::Error(error.clone()));
    }
}

/// Receives the next notification, failing the test after two seconds.
pub async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
