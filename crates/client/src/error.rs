// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::socket::SocketError;

/// All possible errors that can occur in the parley library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid endpoint '{0}'\n  hint: the endpoint must start with ws:// or wss://")]
    InvalidEndpoint(String),

    #[error("config not found at {0}\n  hint: run 'parley init-config {0}' to create one")]
    ConfigNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] parley_core::Error),

    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// A specialized Result type for parley operations.
pub type Result<T> = std::result::Result<T, Error>;
