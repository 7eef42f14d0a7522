// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness check.
//!
//! Every inbound event counts as an ack. On each tick the monitor calls
//! `check` (which pings the server when connected), and if no ack arrived
//! since the previous tick it also calls `reconnect`. The callbacks decide
//! what to do based on the live connection state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type Callback = Arc<dyn Fn() + Send + Sync>;

pub struct HealthMonitor {
    interval: Duration,
    acked: Arc<AtomicBool>,
    check: Callback,
    reconnect: Callback,
    running: Mutex<Option<CancellationToken>>,
}

impl HealthMonitor {
    pub fn new<C, R>(interval: Duration, check: C, reconnect: R) -> Self
    where
        C: Fn() + Send + Sync + 'static,
        R: Fn() + Send + Sync + 'static,
    {
        HealthMonitor {
            interval,
            acked: Arc::new(AtomicBool::new(false)),
            check: Arc::new(check),
            reconnect: Arc::new(reconnect),
            running: Mutex::new(None),
        }
    }

    /// Starts ticking. No-op if already running.
    pub fn start(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        if running.is_some() {
            return;
        }

        let token = CancellationToken::new();
        *running = Some(token.clone());

        let interval = self.interval;
        let acked = Arc::clone(&self.acked);
        let check = Arc::clone(&self.check);
        let reconnect = Arc::clone(&self.reconnect);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let had_ack = acked.swap(false, Ordering::AcqRel);
                        check();
                        if !had_ack {
                            tracing::debug!("no ack during the last health interval");
                            reconnect();
                        }
                    }
                }
            }
        });
    }

    /// Stops ticking. No-op if not running.
    pub fn stop(&self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(token) = running.take() {
                token.cancel();
            }
        }
    }

    /// Records that the connection is alive.
    pub fn ack(&self) {
        self.acked.store(true, Ordering::Release);
    }

    /// Connection lost: keep ticking so the reconnect callback gets a chance.
    pub fn on_disconnected(&self) {
        self.acked.store(false, Ordering::Release);
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
