// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! parley - A chat socket client with offline sync.
//!
//! # Main Components
//!
//! - [`ChatSocket`] - WebSocket connection state machine with health checks,
//!   backoff reconnects and listener fan-out
//! - [`SyncOrchestrator`] - Replays missed history, retries pending mutations
//!   and restores active channels after each reconnect
//! - [`ChatApi`] - Command surface the orchestrator drives
//! - [`Config`] - TOML configuration for both
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley::{ChatSocket, Config, SocketSettings, SyncOrchestrator, WebSocketTransportFactory};
//!
//! let config = Config::load(path)?;
//! let socket = ChatSocket::new(
//!     SocketSettings::from(&config.connection),
//!     Arc::new(WebSocketTransportFactory),
//!     Arc::new(JsonCodec),
//! );
//! let sync = SyncOrchestrator::new(user_id, api, store, Arc::new(socket.subscribe_state()), clock, (&config.sync).into());
//! socket.add_listener(Arc::new(sync.clone()));
//! socket.connect(user, Some(token), false);
//! ```

mod cli;
mod run;

pub mod commands;
pub mod config;
pub mod error;
pub mod socket;
pub mod sync;

pub use cli::{Cli, Command};
pub use commands::{ApiError, ChannelFilter, ChatApi, QueryChannelsRequest, SyncSince};
pub use config::Config;
pub use error::{Error, Result};
pub use run::run;
pub use socket::{
    ChatSocket, ConnectionSnapshot, DisconnectCause, SocketError, SocketListener, SocketSettings,
    WebSocketTransportFactory,
};
pub use sync::{SyncConfig, SyncOrchestrator, SyncOutcome, SyncUpdate};
