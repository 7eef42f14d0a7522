// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Command handlers for the `parley` binary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChatError, ChatEvent, ConnectedEvent, JsonCodec, SqliteStore, Store, User};
use serde_json::json;

use crate::cli::Command;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::socket::{
    ChatSocket, DisconnectCause, SocketListener, SocketSettings, WebSocketTransportFactory,
};

/// How long `watch` waits for a graceful close on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Run a parsed command.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Watch {
            config,
            user,
            token,
            anonymous,
        } => {
            let config = Config::load(&config)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(watch(config, User::new(user), token, anonymous))
        }
        Command::Status { config, user } => status(&Config::load(&config)?, &user),
        Command::InitConfig { path, force } => init_config(&path, force),
    }
}

/// Prints each notification as one JSON line on stdout.
struct JsonLinePrinter;

impl JsonLinePrinter {
    fn print(&self, line: serde_json::Value) {
        println!("{}", line);
    }
}

impl SocketListener for JsonLinePrinter {
    fn on_connecting(&self) {
        self.print(json!({ "lifecycle": "connecting" }));
    }

    fn on_connected(&self, ack: &ConnectedEvent) {
        self.print(json!({ "lifecycle": "connected", "ack": ack }));
    }

    fn on_disconnected(&self, cause: &DisconnectCause) {
        self.print(json!({ "lifecycle": "disconnected", "cause": cause.to_string() }));
    }

    fn on_event(&self, event: &ChatEvent) {
        self.print(json!({ "event": event }));
    }

    fn on_error(&self, error: &ChatError) {
        self.print(json!({ "error": error }));
    }
}

async fn watch(config: Config, user: User, token: Option<String>, anonymous: bool) -> Result<()> {
    let settings = SocketSettings::from(&config.connection);
    let socket = ChatSocket::new(
        settings,
        Arc::new(WebSocketTransportFactory),
        Arc::new(JsonCodec),
    );
    socket.add_listener(Arc::new(JsonLinePrinter));

    tracing::info!(user = %user.id, endpoint = %config.connection.endpoint, "watching");
    socket.connect(user, token, anonymous);

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, closing connection");

    socket.disconnect(DisconnectCause::ConnectionReleased);
    if let Err(e) = socket
        .wait_for(SHUTDOWN_GRACE, "disconnect", |s| s.is_disconnected())
        .await
    {
        tracing::warn!("{}", e);
    }
    tracing::debug!(health_monitoring = socket.is_health_monitoring(), "connection released");
    socket.terminate();
    Ok(())
}

fn status(config: &Config, user_id: &str) -> Result<()> {
    let path = config.database_path();
    if !path.exists() {
        println!("No sync database at {}", path.display());
        return Ok(());
    }
    let store = SqliteStore::open(&path)?;

    match store.load_checkpoint(user_id)? {
        Some(checkpoint) => {
            println!("Checkpoint for {}:", checkpoint.user_id);
            match checkpoint.last_synced_at {
                Some(at) => println!("  last synced:      {}", at.to_rfc3339()),
                None => println!("  last synced:      never"),
            }
            if let Some(at) = checkpoint.marked_all_read_at {
                println!("  marked all read:  {}", at.to_rfc3339());
            }
            println!("  active channels:  {}", checkpoint.active_channel_ids.len());
            for cid in &checkpoint.active_channel_ids {
                println!("    {}", cid);
            }
        }
        None => println!("No checkpoint for {}", user_id),
    }

    let counts = store.count_mutations()?;
    if counts.is_empty() {
        println!("No pending mutations");
    } else {
        println!("Mutations:");
        for (kind, status, count) in counts {
            println!("  {:<10} {:<22} {}", kind.as_str(), status.as_str(), count);
        }
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let config = Config::new("ws://localhost:8080/connect", "");
    config.save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
