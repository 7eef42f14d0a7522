// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for parley-core operations.

use thiserror::Error;

/// All possible errors that can occur in parley-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid sync status transition: cannot go from {from} to {to}\n  hint: from '{from}' you can go to: {valid_targets}")]
    InvalidTransition {
        from: String,
        to: String,
        valid_targets: String,
    },

    #[error("invalid sync status: '{0}'\n  hint: valid statuses are: completed, in_progress, sync_needed, awaiting_attachments, failed_permanently")]
    InvalidSyncStatus(String),

    #[error("invalid mutation kind: '{0}'\n  hint: valid kinds are: channel, message, reaction")]
    InvalidMutationKind(String),

    #[error("invalid channel id: '{0}'\n  hint: channel ids have the form '<type>:<id>'")]
    InvalidCid(String),

    #[error("mutation not found: {kind} {id}")]
    MutationNotFound { kind: String, id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

/// A specialized Result type for parley-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
