// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Channels and queries the embedding application is currently showing.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::commands::QueryChannelsRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuery {
    pub request: QueryChannelsRequest,
    /// Set when the query's last load failed or happened offline.
    pub recovery_needed: bool,
}

#[derive(Default)]
struct Tracked {
    /// cid -> recovery needed
    channels: BTreeMap<String, bool>,
    queries: Vec<ActiveQuery>,
}

/// Registry of active channels and queries, restored after a reconnect.
#[derive(Default)]
pub struct ActiveRegistry {
    tracked: Mutex<Tracked>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        match self.tracked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Starts tracking `cid`. A second call only raises the recovery flag.
    pub fn track_channel(&self, cid: impl Into<String>, recovery_needed: bool) {
        let mut tracked = self.tracked();
        let flag = tracked.channels.entry(cid.into()).or_insert(false);
        *flag |= recovery_needed;
    }

    pub fn untrack_channel(&self, cid: &str) -> bool {
        self.tracked().channels.remove(cid).is_some()
    }

    pub fn mark_channel_recovery_needed(&self, cid: &str) {
        if let Some(flag) = self.tracked().channels.get_mut(cid) {
            *flag = true;
        }
    }

    /// Tracks a query, replacing any query with the same filter.
    pub fn track_query(&self, request: QueryChannelsRequest, recovery_needed: bool) {
        let mut tracked = self.tracked();
        tracked
            .queries
            .retain(|q| q.request.filter != request.filter);
        tracked.queries.push(ActiveQuery {
            request,
            recovery_needed,
        });
    }

    pub fn untrack_queries(&self) {
        self.tracked().queries.clear();
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.tracked().channels.keys().cloned().collect()
    }

    pub fn queries(&self) -> Vec<ActiveQuery> {
        self.tracked().queries.clone()
    }

    /// Channels to restore: all of them, or only the flagged ones.
    pub fn channels_for_recovery(&self, recover_all: bool) -> Vec<String> {
        self.tracked()
            .channels
            .iter()
            .filter(|(_, needed)| recover_all || **needed)
            .map(|(cid, _)| cid.clone())
            .collect()
    }

    /// Queries to re-run: all of them, or only the flagged ones.
    pub fn queries_for_recovery(&self, recover_all: bool) -> Vec<QueryChannelsRequest> {
        self.tracked()
            .queries
            .iter()
            .filter(|q| recover_all || q.recovery_needed)
            .map(|q| q.request.clone())
            .collect()
    }

    pub fn clear_recovery_flags(&self) {
        let mut tracked = self.tracked();
        for flag in tracked.channels.values_mut() {
            *flag = false;
        }
        for query in &mut tracked.queries {
            query.recovery_needed = false;
        }
    }
}
