// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline sync for the chat session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ lifecycle ┌──────────────────┐  commands  ┌─────────────┐
//! │ ChatSocket  │──────────►│ SyncOrchestrator │───────────►│   ChatApi   │
//! │ (listener)  │           │  (per-cycle      │            │   (trait)   │
//! └─────────────┘           │   task scope)    │            └─────────────┘
//!                           └──────────────────┘
//!                              │            │
//!                              ▼            ▼
//!                     ┌─────────────┐  ┌─────────────┐
//!                     │    Store    │  │ SyncUpdate  │  (broadcast)
//!                     │ (checkpoint,│  │ subscribers │
//!                     │  mutations) │  └─────────────┘
//!                     └─────────────┘
//! ```
//!
//! # Features
//!
//! - Retry of pending mutations in channel, message, reaction order
//! - History replay from a monotonic per-user checkpoint
//! - Restoration of active queries and channels after reconnect
//! - Hard cancellation of a cycle's tasks on disconnect

mod active;
mod orchestrator;
mod scope;

pub use active::{ActiveQuery, ActiveRegistry};
pub use orchestrator::{
    ConnectionGate, RetryReport, SyncConfig, SyncError, SyncOrchestrator, SyncOutcome, SyncPhase,
    SyncResult, SyncUpdate,
};
pub use scope::TaskScope;

#[cfg(test)]
mod test_helpers;


#[cfg(test)]
mod orchestrator_tests;
