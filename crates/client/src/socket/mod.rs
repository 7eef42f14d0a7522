// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Chat socket: connection lifecycle over a WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  inputs   ┌──────────────┐  effects  ┌─────────────┐
//! │  ChatSocket  │──────────►│    Driver    │──────────►│  Attempt    │
//! │   (handle)   │◄──────────│ (one writer) │◄──────────│  task       │
//! └──────────────┘ snapshot  └──────────────┘  events   └─────────────┘
//!                                │      ▲                   │
//!                   notifications│      │ticks              ▼
//!                                ▼      │             ┌─────────────┐
//!                        ┌───────────┐ ┌──────────┐   │  Transport  │
//!                        │ Listeners │ │  Health  │   │   (trait)   │
//!                        └───────────┘ └──────────┘   └─────────────┘
//! ```
//!
//! # Features
//!
//! - Pure `(state, event) -> (state, effects)` transition function
//! - One transport task per attempt, tagged by attempt id
//! - Backoff reconnect on parse errors, health-driven reconnect otherwise
//! - Serial listener delivery on a single worker task
//! - Injectable transport factory and codec for testing

mod attempt;
mod dispatch;
mod health;
mod listener;
mod machine;
mod state;
mod transport;

pub use attempt::{FrameSender, TransportEvent, TransportHandle};
pub use dispatch::{Dispatch, EventDispatcher};
pub use health::HealthMonitor;
pub use listener::{ListenerId, ListenerRegistry, Notification, SocketListener};
pub use machine::{ChatSocket, ConnectionSnapshot, SocketError, SocketSettings};
pub use state::{
    transition, ConnectionState, DisconnectCause, Effect, MachineEvent, ShutdownReason,
    StopRequest, Transition,
};
pub use transport::{
    ConnectionConfig, Transport, TransportError, TransportFactory, TransportResult,
    WebSocketTransport, WebSocketTransportFactory,
};

#[cfg(test)]
mod test_helpers;
