// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is a TOML file with two sections:
//! - `[connection]`: endpoint, api key, retry and health-check tuning
//! - `[sync]`: offline sync limits and the state database location

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const STATE_DIR_NAME: &str = "parley";
const DB_FILE_NAME: &str = "sync.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Socket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// WebSocket endpoint (`ws://...` or `wss://...`).
    pub endpoint: String,
    pub api_key: String,
    /// Maximum backoff reconnects after parse failures (default: 3).
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Base delay for the `base * attempt²` backoff in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Health check interval in milliseconds (default: 10000).
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Max time to wait for the transport to open in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Offline sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pending mutations older than this are dropped instead of resent (default: 12h).
    #[serde(default = "default_max_threshold_secs")]
    pub max_threshold_secs: u64,
    /// Active queries re-run after a reconnect (default: 3).
    #[serde(default = "default_queries_to_retry")]
    pub queries_to_retry: usize,
    /// Active channels restored after a reconnect (default: 30).
    #[serde(default = "default_channels_to_restore")]
    pub channels_to_restore: usize,
    /// Path of the sync database; defaults to the user state directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

fn default_retry_limit() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_threshold_secs() -> u64 {
    12 * 60 * 60
}

fn default_queries_to_retry() -> usize {
    3
}

fn default_channels_to_restore() -> usize {
    30
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            endpoint: "ws://localhost:8080/connect".to_string(),
            api_key: String::new(),
            retry_limit: default_retry_limit(),
            base_delay_ms: default_base_delay_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_threshold_secs: default_max_threshold_secs(),
            queries_to_retry: default_queries_to_retry(),
            channels_to_restore: default_channels_to_restore(),
            database: None,
        }
    }
}

impl ConnectionSettings {
    /// Validates the endpoint scheme.
    pub fn validate_endpoint(&self) -> Result<()> {
        if self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://") {
            Ok(())
        } else {
            Err(Error::InvalidEndpoint(self.endpoint.clone()))
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SyncSettings {
    pub fn max_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.max_threshold_secs).unwrap_or(i64::MAX))
    }
}

impl Config {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Config {
            connection: ConnectionSettings {
                endpoint: endpoint.into(),
                api_key: api_key.into(),
                ..ConnectionSettings::default()
            },
            sync: SyncSettings::default(),
        }
    }

    /// Loads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.connection.validate_endpoint()?;
        Ok(config)
    }

    /// Writes the config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Path of the sync database.
    pub fn database_path(&self) -> PathBuf {
        self.sync
            .database
            .clone()
            .unwrap_or_else(|| state_dir().join(DB_FILE_NAME))
    }
}

/// Returns the user-level state directory for parley.
///
/// Uses `$XDG_STATE_HOME/parley` if set, otherwise `~/.local/state/parley`.
pub fn state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join(STATE_DIR_NAME);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("state")
        .join(STATE_DIR_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
