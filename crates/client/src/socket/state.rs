// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection states and the pure transition function.
//!
//! [`transition`] takes the current [`ConnectionState`] and a
//! [`MachineEvent`] and returns the next state plus a list of [`Effect`]s.
//! It performs no I/O. The socket driver applies the effects afterwards,
//! and any result of that I/O comes back as a new event.
//!
//! ```text
//!                 Start(handle)                ServerAckReceived
//!  Disconnected ───────────────▶ Connecting ─────────────────────▶ Connected
//!       ▲  ▲                        │  │                              │  │
//!       │  └──TransportTerminated───┘  └────Stop────┐     ┌───Stop────┘  │
//!       │                                           ▼     ▼              │
//!       └──────────TransportTerminated────────── Disconnecting           │
//!       └──────────────────────TransportTerminated───────────────────────┘
//!
//!  Terminate from any live state ──▶ Destroyed (absorbing)
//! ```
//!
//! `H` is the transport handle type. The driver uses a real handle; tests
//! use plain integers.

use std::fmt;

use parley_core::{ChatError, ConnectedEvent};

/// Why the connection went (or is going) down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Released on purpose, no error involved.
    ConnectionReleased,
    /// Recoverable failure; the health monitor may reconnect.
    Error(Option<ChatError>),
    /// Credentials or request rejected; needs caller intervention.
    UnrecoverableError(ChatError),
}

impl DisconnectCause {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DisconnectCause::Error(_))
    }

    pub fn error(&self) -> Option<&ChatError> {
        match self {
            DisconnectCause::ConnectionReleased => None,
            DisconnectCause::Error(err) => err.as_ref(),
            DisconnectCause::UnrecoverableError(err) => Some(err),
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::ConnectionReleased => write!(f, "connection released"),
            DisconnectCause::Error(None) => write!(f, "error"),
            DisconnectCause::Error(Some(err)) => write!(f, "error: {}", err),
            DisconnectCause::UnrecoverableError(err) => write!(f, "unrecoverable error: {}", err),
        }
    }
}

/// Close code and reason sent with a graceful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReason {
    pub code: u16,
    pub reason: String,
}

impl ShutdownReason {
    pub const NORMAL_CLOSURE: u16 = 1000;

    pub fn normal(reason: impl Into<String>) -> Self {
        ShutdownReason {
            code: Self::NORMAL_CLOSURE,
            reason: reason.into(),
        }
    }
}

/// How a live transport should be brought down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopRequest {
    /// Close handshake with the given reason.
    WithReason {
        reason: ShutdownReason,
        cause: DisconnectCause,
    },
    /// Drop the transport without a handshake.
    Aborted { cause: DisconnectCause },
}

impl StopRequest {
    pub fn cause(&self) -> &DisconnectCause {
        match self {
            StopRequest::WithReason { cause, .. } | StopRequest::Aborted { cause } => cause,
        }
    }
}

/// The single live connection state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState<H> {
    Disconnected(DisconnectCause),
    Connecting {
        transport: H,
    },
    Connected {
        transport: H,
        ack: ConnectedEvent,
    },
    Disconnecting {
        cause: DisconnectCause,
        pending_start: bool,
    },
    Destroyed,
}

impl<H> ConnectionState<H> {
    /// Initial state of a new session.
    pub fn initial() -> Self {
        ConnectionState::Disconnected(DisconnectCause::ConnectionReleased)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected(_) => "disconnected",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected { .. } => "connected",
            ConnectionState::Disconnecting { .. } => "disconnecting",
            ConnectionState::Destroyed => "destroyed",
        }
    }

    /// The transport owned by this state, if any.
    pub fn transport(&self) -> Option<&H> {
        match self {
            ConnectionState::Connecting { transport } | ConnectionState::Connected { transport, .. } => {
                Some(transport)
            }
            _ => None,
        }
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent<H> {
    /// Begin an attempt. `None` when no connection config is stored.
    Start(Option<H>),
    Stop(StopRequest),
    Terminate,
    TransportOpened,
    ServerAckReceived(ConnectedEvent),
    TransportTerminated,
}

impl<H> MachineEvent<H> {
    pub fn name(&self) -> &'static str {
        match self {
            MachineEvent::Start(_) => "start",
            MachineEvent::Stop(_) => "stop",
            MachineEvent::Terminate => "terminate",
            MachineEvent::TransportOpened => "transport_opened",
            MachineEvent::ServerAckReceived(_) => "server_ack_received",
            MachineEvent::TransportTerminated => "transport_terminated",
        }
    }
}

/// Side effects requested by a transition, applied in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<H> {
    OpenTransport(H),
    CloseTransport(H, ShutdownReason),
    AbortTransport(H),
    CancelTransport(H),
    /// The next inbound event must be the connection ack.
    ExpectAck,
    StartHealth,
    StopHealth,
    HealthDisconnected,
    NotifyConnecting,
    NotifyConnected(ConnectedEvent),
    NotifyDisconnected(DisconnectCause),
    ReplayPendingStart,
    DisposeObservers,
}

/// Result of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<H> {
    pub state: ConnectionState<H>,
    pub effects: Vec<Effect<H>>,
    /// False when the event was refused and the state left unchanged.
    pub accepted: bool,
}

impl<H> Transition<H> {
    fn to(state: ConnectionState<H>, effects: Vec<Effect<H>>) -> Self {
        Transition {
            state,
            effects,
            accepted: true,
        }
    }

    fn stay(state: ConnectionState<H>) -> Self {
        Self::to(state, Vec::new())
    }

    fn refuse(state: ConnectionState<H>) -> Self {
        Transition {
            state,
            effects: Vec::new(),
            accepted: false,
        }
    }
}

/// Computes the next state for `event`.
pub fn transition<H: Clone>(state: ConnectionState<H>, event: MachineEvent<H>) -> Transition<H> {
    use ConnectionState as S;
    use MachineEvent as E;

    match (state, event) {
        (S::Disconnected(_), E::Start(Some(transport))) => enter_connecting(transport),
        (state @ S::Disconnected(_), E::Start(None)) => Transition::stay(state),
        (state @ S::Disconnected(_), E::Stop(_)) => Transition::stay(state),
        (S::Disconnected(_), E::Terminate) => enter_destroyed(None),

        (S::Connecting { transport }, E::TransportOpened) => {
            Transition::to(S::Connecting { transport }, vec![Effect::ExpectAck])
        }
        (S::Connecting { transport }, E::ServerAckReceived(ack))
        | (S::Connected { transport, .. }, E::ServerAckReceived(ack)) => {
            enter_connected(transport, ack)
        }
        (S::Connecting { .. } | S::Connected { .. }, E::TransportTerminated) => {
            enter_disconnected(DisconnectCause::Error(None), false)
        }
        (S::Connecting { transport }, E::Stop(stop)) => Transition::to(
            S::Disconnecting {
                cause: stop.cause().clone(),
                pending_start: false,
            },
            vec![Effect::AbortTransport(transport)],
        ),
        (S::Connected { transport, .. }, E::Stop(stop)) => enter_disconnecting(transport, stop),
        (S::Connecting { transport }, E::Terminate)
        | (S::Connected { transport, .. }, E::Terminate) => enter_destroyed(Some(transport)),
        (state @ S::Connected { .. }, E::Start(_)) => Transition::stay(state),

        (S::Disconnecting { cause, .. }, E::Start(_)) => Transition::stay(S::Disconnecting {
            cause,
            pending_start: true,
        }),
        (
            S::Disconnecting {
                cause,
                pending_start,
            },
            E::TransportTerminated,
        ) => enter_disconnected(cause, pending_start),
        (S::Disconnecting { .. }, E::Terminate) => enter_destroyed(None),

        (state, _) => Transition::refuse(state),
    }
}

fn enter_connecting<H: Clone>(transport: H) -> Transition<H> {
    let effects = vec![
        Effect::StopHealth,
        Effect::NotifyConnecting,
        Effect::OpenTransport(transport.clone()),
    ];
    Transition::to(ConnectionState::Connecting { transport }, effects)
}

fn enter_connected<H>(transport: H, ack: ConnectedEvent) -> Transition<H> {
    let effects = vec![Effect::StartHealth, Effect::NotifyConnected(ack.clone())];
    Transition::to(ConnectionState::Connected { transport, ack }, effects)
}

fn enter_disconnecting<H>(transport: H, stop: StopRequest) -> Transition<H> {
    let (cause, effect) = match stop {
        StopRequest::WithReason { reason, cause } => {
            (cause, Effect::CloseTransport(transport, reason))
        }
        StopRequest::Aborted { cause } => (cause, Effect::AbortTransport(transport)),
    };
    Transition::to(
        ConnectionState::Disconnecting {
            cause,
            pending_start: false,
        },
        vec![effect],
    )
}

fn enter_disconnected<H>(cause: DisconnectCause, replay_start: bool) -> Transition<H> {
    let mut effects = Vec::with_capacity(3);
    if cause.is_recoverable() {
        effects.push(Effect::HealthDisconnected);
    } else {
        effects.push(Effect::StopHealth);
    }
    effects.push(Effect::NotifyDisconnected(cause.clone()));
    if replay_start {
        effects.push(Effect::ReplayPendingStart);
    }
    Transition::to(ConnectionState::Disconnected(cause), effects)
}

fn enter_destroyed<H>(transport: Option<H>) -> Transition<H> {
    let mut effects: Vec<Effect<H>> = transport.map(Effect::CancelTransport).into_iter().collect();
    effects.push(Effect::StopHealth);
    effects.push(Effect::DisposeObservers);
    Transition::to(ConnectionState::Destroyed, effects)
}
