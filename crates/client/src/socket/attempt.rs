// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A single connection attempt.
//!
//! Each attempt owns one [`Transport`] inside its own task. The state
//! machine holds a [`TransportHandle`] to it and talks to the task through
//! a channel, so no transition ever awaits I/O. The task reports back with
//! [`TransportEvent`]s and always finishes with `Terminated` once the
//! transport has been dropped.

use std::fmt;
use std::time::Duration;

use parley_core::ChatError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::state::ShutdownReason;
use super::transport::{ConnectionConfig, Transport, TransportError};

/// Commands for the attempt task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Close(ShutdownReason),
}

/// What an attempt task reports to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Failed(ChatError),
    Terminated,
}

/// Clonable handle to an attempt task.
#[derive(Clone)]
pub struct TransportHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl TransportHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sender for outbound frames on this attempt.
    pub fn sender(&self) -> FrameSender {
        FrameSender {
            attempt: self.id,
            outbound: self.outbound.clone(),
        }
    }

    /// Requests a graceful close.
    pub(crate) fn close(&self, reason: ShutdownReason) {
        if self.outbound.send(Outbound::Close(reason)).is_err() {
            // Task already gone; make sure it is not waiting on connect.
            self.cancel.cancel();
        }
    }

    /// Drops the transport without a close handshake.
    pub(crate) fn abort(&self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").field("id", &self.id).finish()
    }
}

impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Non-blocking outbound frame queue of a connected attempt.
#[derive(Clone)]
pub struct FrameSender {
    attempt: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    /// Queues a frame. Returns false if the attempt has ended.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(Outbound::Frame(text)).is_ok()
    }
}

impl fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSender")
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// An attempt that has a handle but whose task has not started.
pub(crate) struct PendingAttempt {
    handle: TransportHandle,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    config: ConnectionConfig,
}

impl PendingAttempt {
    pub(crate) fn new(id: u64, config: ConnectionConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        PendingAttempt {
            handle: TransportHandle {
                id,
                outbound,
                cancel: CancellationToken::new(),
            },
            outbound_rx,
            config,
        }
    }

    pub(crate) fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    /// Spawns the attempt task.
    pub(crate) fn spawn<F>(self, transport: Box<dyn Transport>, connect_timeout: Duration, report: F)
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        tokio::spawn(drive(self, transport, connect_timeout, report));
    }
}

async fn drive<F>(
    attempt: PendingAttempt,
    mut transport: Box<dyn Transport>,
    connect_timeout: Duration,
    report: F,
) where
    F: Fn(TransportEvent) + Send + Sync + 'static,
{
    let PendingAttempt {
        handle,
        mut outbound_rx,
        config,
    } = attempt;
    let id = handle.id;
    let cancel = handle.cancel.clone();
    drop(handle);

    tracing::debug!(attempt = id, reconnect = config.reconnect, "opening transport");
    let opened = tokio::select! {
        _ = cancel.cancelled() => false,
        result = tokio::time::timeout(connect_timeout, transport.connect(&config)) => match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(attempt = id, "transport failed to open: {}", e);
                report(TransportEvent::Failed(e.to_chat_error()));
                false
            }
            Err(_) => {
                tracing::warn!(attempt = id, "transport open timed out");
                report(TransportEvent::Failed(TransportError::Timeout.to_chat_error()));
                false
            }
        },
    };

    if opened {
        report(TransportEvent::Opened);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt = id, "transport aborted");
                    break;
                }
                command = outbound_rx.recv() => match command {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = transport.send(text).await {
                            report(TransportEvent::Failed(e.to_chat_error()));
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        tracing::debug!(attempt = id, code = reason.code, "closing transport");
                        let _ = transport.disconnect(&reason).await;
                        break;
                    }
                    None => break,
                },
                frame = transport.recv() => match frame {
                    Ok(Some(text)) => report(TransportEvent::Frame(text)),
                    Ok(None) => {
                        tracing::debug!(attempt = id, "transport closed by peer");
                        break;
                    }
                    Err(e) => {
                        report(TransportEvent::Failed(e.to_chat_error()));
                        break;
                    }
                },
            }
        }
    }

    drop(transport);
    report(TransportEvent::Terminated);
}
