// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The chat socket driver.
//!
//! [`ChatSocket`] is a thin handle around a single driver task. Every input
//! (public calls, transport events, health ticks, backoff timers) is posted
//! to the driver's inbox. The driver feeds them through [`transition`],
//! publishes the new [`ConnectionSnapshot`] and then applies the effects.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_core::{ChatError, ChatEvent, Codec, ConnectedEvent, ErrorClass, ErrorCode, User};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::attempt::{FrameSender, PendingAttempt, TransportEvent, TransportHandle};
use super::dispatch::{Dispatch, EventDispatcher};
use super::health::HealthMonitor;
use super::listener::{ListenerId, ListenerRegistry, Notification, SocketListener};
use super::state::{
    transition, ConnectionState, DisconnectCause, Effect, MachineEvent, ShutdownReason,
    StopRequest, Transition,
};
use super::transport::{ConnectionConfig, TransportFactory};
use crate::config::ConnectionSettings;

/// Errors from the socket's public contract.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("invalid socket state: {0}")]
    InvalidState(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("socket session has ended")]
    Closed,
}

/// Tuning for one socket session.
#[derive(Debug, Clone)]
pub struct SocketSettings {
    pub endpoint: String,
    pub api_key: String,
    pub retry_limit: u32,
    pub base_delay: Duration,
    pub health_check_interval: Duration,
    pub connect_timeout: Duration,
}

impl From<&ConnectionSettings> for SocketSettings {
    fn from(settings: &ConnectionSettings) -> Self {
        SocketSettings {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            retry_limit: settings.retry_limit,
            base_delay: settings.base_delay(),
            health_check_interval: settings.health_check_interval(),
            connect_timeout: settings.connect_timeout(),
        }
    }
}

/// Read-only view of the connection, published after every transition.
#[derive(Debug, Clone)]
pub enum ConnectionSnapshot {
    Disconnected(DisconnectCause),
    Connecting,
    Connected {
        ack: ConnectedEvent,
        sender: FrameSender,
    },
    Disconnecting(DisconnectCause),
    Destroyed,
}

impl ConnectionSnapshot {
    fn of(state: &ConnectionState<TransportHandle>) -> Self {
        match state {
            ConnectionState::Disconnected(cause) => ConnectionSnapshot::Disconnected(cause.clone()),
            ConnectionState::Connecting { .. } => ConnectionSnapshot::Connecting,
            ConnectionState::Connected { transport, ack } => ConnectionSnapshot::Connected {
                ack: ack.clone(),
                sender: transport.sender(),
            },
            ConnectionState::Disconnecting { cause, .. } => {
                ConnectionSnapshot::Disconnecting(cause.clone())
            }
            ConnectionState::Destroyed => ConnectionSnapshot::Destroyed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionSnapshot::Disconnected(_) => "disconnected",
            ConnectionSnapshot::Connecting => "connecting",
            ConnectionSnapshot::Connected { .. } => "connected",
            ConnectionSnapshot::Disconnecting(_) => "disconnecting",
            ConnectionSnapshot::Destroyed => "destroyed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionSnapshot::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionSnapshot::Connecting)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionSnapshot::Disconnected(_))
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            ConnectionSnapshot::Connected { ack, .. } => Some(&ack.connection_id),
            _ => None,
        }
    }

    /// Cause of the current or in-progress disconnect.
    pub fn disconnect_cause(&self) -> Option<&DisconnectCause> {
        match self {
            ConnectionSnapshot::Disconnected(cause) | ConnectionSnapshot::Disconnecting(cause) => {
                Some(cause)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Input {
    Connect(ConnectionConfig),
    Reconnect(ConnectionConfig),
    Disconnect(DisconnectCause),
    Terminate,
    Transport { attempt: u64, event: TransportEvent },
    HealthTick,
    HealthReconnect,
    BackoffElapsed(u64),
}

#[derive(Default)]
struct Counters {
    reconnection_attempts: AtomicU32,
    token_expired: AtomicBool,
    health_running: AtomicBool,
}

/// A chat socket session.
///
/// Dropping the handle terminates the session.
pub struct ChatSocket {
    settings: SocketSettings,
    inbox: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    listeners: Arc<ListenerRegistry>,
    counters: Arc<Counters>,
    codec: Arc<dyn Codec>,
}

impl ChatSocket {
    /// Creates a session and spawns its driver.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        settings: SocketSettings,
        factory: Arc<dyn TransportFactory>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ConnectionSnapshot::of(
            &ConnectionState::initial(),
        ));
        let listeners = ListenerRegistry::new();
        let counters = Arc::new(Counters::default());

        let health = {
            let check = inbox.clone();
            let reconnect = inbox.clone();
            HealthMonitor::new(
                settings.health_check_interval,
                move || {
                    let _ = check.send(Input::HealthTick);
                },
                move || {
                    let _ = reconnect.send(Input::HealthReconnect);
                },
            )
        };

        let driver = Driver {
            settings: settings.clone(),
            state: ConnectionState::initial(),
            config: None,
            pending: None,
            closing: None,
            next_attempt: 0,
            dispatcher: EventDispatcher::new(Arc::clone(&codec)),
            health,
            listeners: Arc::clone(&listeners),
            snapshot: snapshot_tx,
            inbox: inbox.clone(),
            factory,
            codec: Arc::clone(&codec),
            counters: Arc::clone(&counters),
            backoff: None,
            backoff_generation: 0,
        };
        tokio::spawn(driver.run(inbox_rx));

        ChatSocket {
            settings,
            inbox,
            snapshot,
            listeners,
            counters,
            codec,
        }
    }

    fn config_for(&self, user: User, token: Option<String>, anonymous: bool) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.settings.endpoint.clone(),
            api_key: self.settings.api_key.clone(),
            user,
            token,
            anonymous,
            reconnect: false,
        }
    }

    /// Stores a new connection config and starts an attempt.
    pub fn connect(&self, user: User, token: Option<String>, anonymous: bool) {
        self.connect_with(self.config_for(user, token, anonymous));
    }

    pub fn connect_with(&self, config: ConnectionConfig) {
        let _ = self.inbox.send(Input::Connect(config));
    }

    /// Drops the current connection and connects again with a new config.
    pub fn reconnect_user(&self, user: User, token: Option<String>, anonymous: bool) {
        let _ = self
            .inbox
            .send(Input::Reconnect(self.config_for(user, token, anonymous)));
    }

    /// Closes the connection and forgets the stored config.
    pub fn disconnect(&self, cause: DisconnectCause) {
        let _ = self.inbox.send(Input::Disconnect(cause));
    }

    /// Ends the session for good.
    pub fn terminate(&self) {
        let _ = self.inbox.send(Input::Terminate);
    }

    /// Queues `event` on the live connection.
    ///
    /// Returns false without waiting when not connected.
    pub fn send(&self, event: &ChatEvent) -> bool {
        let snapshot = self.snapshot.borrow();
        let ConnectionSnapshot::Connected { sender, .. } = &*snapshot else {
            tracing::debug!(state = snapshot.name(), "dropping outbound event while not connected");
            return false;
        };
        match self.codec.encode(event) {
            Ok(text) => sender.send(text),
            Err(e) => {
                tracing::warn!("failed to encode outbound event: {}", e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().is_connected()
    }

    /// Id assigned by the server to the live connection.
    pub fn connection_id(&self) -> Result<String, SocketError> {
        let snapshot = self.snapshot.borrow();
        snapshot.connection_id().map(str::to_string).ok_or_else(|| {
            SocketError::InvalidState(format!(
                "connection id requested while {}",
                snapshot.name()
            ))
        })
    }

    pub fn state(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for<F>(
        &self,
        timeout: Duration,
        what: &'static str,
        mut predicate: F,
    ) -> Result<ConnectionSnapshot, SocketError>
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(SocketError::Closed),
            Err(_) => Err(SocketError::Timeout(what)),
        };
        result
    }

    /// Waits until the socket is connected and returns the ack.
    pub async fn await_connected(&self, timeout: Duration) -> Result<ConnectedEvent, SocketError> {
        let snapshot = self
            .wait_for(timeout, "connection", |s| {
                s.is_connected() || matches!(s, ConnectionSnapshot::Destroyed)
            })
            .await?;
        match snapshot {
            ConnectionSnapshot::Connected { ack, .. } => Ok(ack),
            _ => Err(SocketError::Closed),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SocketListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn reconnection_attempts(&self) -> u32 {
        self.counters.reconnection_attempts.load(Ordering::Acquire)
    }

    /// True after an authentication error, until the next `connect`.
    pub fn is_token_expired(&self) -> bool {
        self.counters.token_expired.load(Ordering::Acquire)
    }

    /// True while the health monitor is ticking. It keeps ticking across
    /// recoverable drops and stops once the config is released.
    pub fn is_health_monitoring(&self) -> bool {
        self.counters.health_running.load(Ordering::Acquire)
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        let _ = self.inbox.send(Input::Terminate);
    }
}

/// Single writer of the connection state.
struct Driver {
    settings: SocketSettings,
    state: ConnectionState<TransportHandle>,
    config: Option<ConnectionConfig>,
    pending: Option<PendingAttempt>,
    /// Attempt being torn down while in `Disconnecting`.
    closing: Option<u64>,
    next_attempt: u64,
    dispatcher: EventDispatcher,
    health: HealthMonitor,
    listeners: Arc<ListenerRegistry>,
    snapshot: watch::Sender<ConnectionSnapshot>,
    inbox: mpsc::UnboundedSender<Input>,
    factory: Arc<dyn TransportFactory>,
    codec: Arc<dyn Codec>,
    counters: Arc<Counters>,
    backoff: Option<CancellationToken>,
    backoff_generation: u64,
}

impl Driver {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inbox.recv().await {
            self.handle(input);
            self.counters
                .health_running
                .store(self.health.is_running(), Ordering::Release);
            if matches!(self.state, ConnectionState::Destroyed) {
                break;
            }
        }
        self.health.stop();
        self.counters.health_running.store(false, Ordering::Release);
        self.cancel_backoff();
        tracing::debug!("socket driver stopped");
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Connect(config) => {
                self.counters.token_expired.store(false, Ordering::Release);
                self.config = Some(config);
                self.start_attempt();
            }
            Input::Reconnect(config) => self.reconnect(config),
            Input::Disconnect(cause) => self.disconnect(cause),
            Input::Terminate => {
                self.cancel_backoff();
                self.fire(MachineEvent::Terminate);
            }
            Input::Transport { attempt, event } => self.on_transport(attempt, event),
            Input::HealthTick => self.send_heartbeat(),
            Input::HealthReconnect => self.health_reconnect(),
            Input::BackoffElapsed(generation) => self.backoff_elapsed(generation),
        }
    }

    fn fire(&mut self, event: MachineEvent<TransportHandle>) {
        let event_name = event.name();
        let from = self.state.name();
        let current = std::mem::replace(&mut self.state, ConnectionState::Destroyed);
        let Transition {
            state,
            effects,
            accepted,
        } = transition(current, event);

        if !accepted {
            tracing::warn!(state = from, event = event_name, "cannot handle event in this state");
        } else if state.name() != from {
            tracing::info!(from, to = state.name(), event = event_name, "connection state changed");
        }

        self.state = state;
        self.snapshot.send_replace(ConnectionSnapshot::of(&self.state));
        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect<TransportHandle>) {
        match effect {
            Effect::OpenTransport(handle) => self.open(handle),
            Effect::CloseTransport(handle, reason) => {
                self.closing = Some(handle.id());
                handle.close(reason);
            }
            Effect::AbortTransport(handle) => {
                self.closing = Some(handle.id());
                handle.abort();
            }
            Effect::CancelTransport(handle) => handle.abort(),
            Effect::ExpectAck => self.dispatcher.expect_ack(),
            Effect::StartHealth => {
                self.health.ack();
                self.health.start();
            }
            Effect::StopHealth => self.health.stop(),
            // Without a config there is nothing left to reconnect.
            Effect::HealthDisconnected if self.config.is_none() => self.health.stop(),
            Effect::HealthDisconnected => self.health.on_disconnected(),
            Effect::NotifyConnecting => self.listeners.notify(Notification::Connecting),
            Effect::NotifyConnected(ack) => self.listeners.notify(Notification::Connected(ack)),
            Effect::NotifyDisconnected(cause) => {
                self.listeners.notify(Notification::Disconnected(cause))
            }
            Effect::ReplayPendingStart => self.start_attempt(),
            Effect::DisposeObservers => {
                self.cancel_backoff();
                self.pending = None;
            }
        }
    }

    /// Mints a handle for the stored config and emits Start.
    fn start_attempt(&mut self) {
        let event = match &self.config {
            Some(config) => {
                self.next_attempt += 1;
                let pending = PendingAttempt::new(self.next_attempt, config.clone());
                let handle = pending.handle().clone();
                self.pending = Some(pending);
                MachineEvent::Start(Some(handle))
            }
            None => MachineEvent::Start(None),
        };
        self.fire(event);
    }

    fn open(&mut self, handle: TransportHandle) {
        let attempt = handle.id();
        match self.pending.take() {
            Some(pending) if pending.handle().id() == attempt => {
                self.dispatcher.expect_ack();
                let inbox = self.inbox.clone();
                pending.spawn(
                    self.factory.create(),
                    self.settings.connect_timeout,
                    move |event| {
                        let _ = inbox.send(Input::Transport { attempt, event });
                    },
                );
            }
            _ => {
                tracing::error!(attempt, "no pending transport for attempt");
                let _ = self.inbox.send(Input::Transport {
                    attempt,
                    event: TransportEvent::Terminated,
                });
            }
        }
    }

    fn on_transport(&mut self, attempt: u64, event: TransportEvent) {
        let live = self.state.transport().map(TransportHandle::id) == Some(attempt);
        let closing = self.closing == Some(attempt);
        match event {
            TransportEvent::Opened if live => self.fire(MachineEvent::TransportOpened),
            TransportEvent::Frame(text) if live => self.on_frame(&text),
            TransportEvent::Failed(err) if live => self.handle_error(err),
            TransportEvent::Terminated if live || closing => {
                if closing {
                    self.closing = None;
                }
                self.fire(MachineEvent::TransportTerminated);
            }
            other => {
                tracing::debug!(attempt, event = ?other, "ignoring event from stale transport")
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        match self.dispatcher.dispatch(text) {
            Dispatch::Error(err) => self.handle_error(err),
            Dispatch::Ack(ack) => {
                self.health.ack();
                self.fire(MachineEvent::ServerAckReceived(ack));
            }
            Dispatch::Event(event) => {
                self.health.ack();
                self.listeners.notify(Notification::Event(event));
            }
        }
    }

    fn handle_error(&mut self, err: ChatError) {
        let class = err.class();
        tracing::warn!(code = err.code, ?class, "socket error: {}", err);
        self.listeners.notify(Notification::Error(err.clone()));
        if err.is_authentication_error() {
            self.counters.token_expired.store(true, Ordering::Release);
        }

        match class {
            ErrorClass::Transient => {
                let attempts = self.counters.reconnection_attempts.load(Ordering::Acquire);
                if self.backoff.is_some() {
                    tracing::debug!("reconnect already scheduled");
                } else if attempts < self.settings.retry_limit && self.config.is_some() {
                    self.schedule_backoff(attempts);
                } else {
                    tracing::info!(attempts, "retry limit reached, leaving recovery to health checks");
                    self.stop_with(DisconnectCause::Error(Some(err)));
                }
            }
            ErrorClass::Unrecoverable => self.disconnect(DisconnectCause::UnrecoverableError(err)),
            ErrorClass::Network => self.stop_with(DisconnectCause::Error(Some(err))),
        }
    }

    fn schedule_backoff(&mut self, attempts: u32) {
        let delay = self
            .settings
            .base_delay
            .saturating_mul(attempts.saturating_mul(attempts));
        tracing::info!(attempt = attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        self.backoff_generation += 1;
        let generation = self.backoff_generation;
        let token = CancellationToken::new();
        self.backoff = Some(token.clone());
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = inbox.send(Input::BackoffElapsed(generation));
                }
            }
        });
    }

    fn cancel_backoff(&mut self) {
        if let Some(token) = self.backoff.take() {
            tracing::debug!("cancelling scheduled reconnect");
            token.cancel();
        }
    }

    fn backoff_elapsed(&mut self, generation: u64) {
        if generation != self.backoff_generation || self.backoff.is_none() {
            return;
        }
        self.backoff = None;
        let Some(config) = self.config.as_ref().map(ConnectionConfig::as_reconnect) else {
            return;
        };
        let attempts = self.counters.reconnection_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(attempts, "reconnecting after backoff");
        self.reconnect(config);
    }

    fn reconnect(&mut self, config: ConnectionConfig) {
        self.stop_with(DisconnectCause::Error(Some(ChatError::new(ErrorCode::ParserError))));
        self.config = Some(config);
        self.start_attempt();
    }

    /// Stops the transport but keeps the config for later recovery.
    fn stop_with(&mut self, cause: DisconnectCause) {
        self.fire(MachineEvent::Stop(StopRequest::WithReason {
            reason: ShutdownReason::normal("connection error"),
            cause,
        }));
    }

    fn disconnect(&mut self, cause: DisconnectCause) {
        self.cancel_backoff();
        if matches!(cause, DisconnectCause::UnrecoverableError(_)) {
            self.counters.reconnection_attempts.store(0, Ordering::Release);
        }
        self.config = None;
        if matches!(self.state, ConnectionState::Disconnected(_)) {
            self.health.stop();
        }
        self.fire(MachineEvent::Stop(StopRequest::WithReason {
            reason: ShutdownReason::normal("disconnected by client"),
            cause,
        }));
    }

    fn health_reconnect(&mut self) {
        match &self.state {
            ConnectionState::Disconnected(cause) if cause.is_recoverable() => {
                if let Some(config) = self.config.as_ref().map(ConnectionConfig::as_reconnect) {
                    tracing::info!("health check reconnecting");
                    self.config = Some(config);
                    self.start_attempt();
                }
            }
            ConnectionState::Connected { .. } => {
                tracing::warn!("no events during the last health interval, aborting transport");
                self.fire(MachineEvent::Stop(StopRequest::Aborted {
                    cause: DisconnectCause::Error(None),
                }));
            }
            _ => {}
        }
    }

    fn send_heartbeat(&mut self) {
        let ConnectionState::Connected { transport, ack } = &self.state else {
            return;
        };
        let heartbeat = ChatEvent::health_check(ack.connection_id.clone(), Utc::now());
        match self.codec.encode(&heartbeat) {
            Ok(text) => {
                if !transport.sender().send(text) {
                    tracing::debug!("heartbeat not sent, transport gone");
                }
            }
            Err(e) => tracing::warn!("failed to encode heartbeat: {}", e),
        }
    }
}
