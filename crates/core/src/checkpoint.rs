// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline sync checkpoint.
//!
//! One record per user marks how far event history has been replayed.
//! `last_synced_at` and `marked_all_read_at` are high-water marks: the
//! update methods ignore anything older than what is already stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub user_id: String,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Server timestamp string matching `last_synced_at`, kept verbatim so
    /// the next history request uses the server's own precision.
    #[serde(default)]
    pub last_synced_raw: Option<String>,
    #[serde(default)]
    pub marked_all_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_channel_ids: BTreeSet<String>,
}

impl SyncCheckpoint {
    pub fn new(user_id: impl Into<String>) -> Self {
        SyncCheckpoint {
            user_id: user_id.into(),
            last_synced_at: None,
            last_synced_raw: None,
            marked_all_read_at: None,
            active_channel_ids: BTreeSet::new(),
        }
    }

    /// Moves `last_synced_at` forward. Returns false if `at` is not newer.
    pub fn advance(&mut self, at: DateTime<Utc>, raw: Option<String>) -> bool {
        if self.last_synced_at.is_some_and(|current| at <= current) {
            return false;
        }
        self.last_synced_at = Some(at);
        self.last_synced_raw = raw;
        true
    }

    /// Records a mark-all-read. Returns false if an equal or newer one is stored.
    pub fn mark_all_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.marked_all_read_at.is_some_and(|current| at <= current) {
            return false;
        }
        self.marked_all_read_at = Some(at);
        true
    }

    /// Whether `raw` is the token this checkpoint already points at.
    pub fn is_at(&self, raw: Option<&str>, at: DateTime<Utc>) -> bool {
        match (raw, self.last_synced_raw.as_deref()) {
            (Some(raw), Some(stored)) => raw == stored,
            _ => self.last_synced_at == Some(at),
        }
    }

    pub fn with_active_channels<I>(mut self, cids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.active_channel_ids = cids.into_iter().collect();
        self
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
