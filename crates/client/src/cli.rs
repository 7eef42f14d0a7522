// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat socket client with offline sync")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, value_name = "path")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect and print every event and lifecycle change as a JSON line
    #[command(after_help = "\
Examples:
  parley watch --config parley.toml --user alice --token $TOKEN
  parley watch --config parley.toml --user guest --anonymous")]
    Watch {
        #[arg(long, value_name = "file")]
        config: PathBuf,

        #[arg(long, value_name = "id", value_parser = non_empty_string)]
        user: String,

        /// Session token for the user
        #[arg(long)]
        token: Option<String>,

        /// Connect without user credentials
        #[arg(long, conflicts_with = "token")]
        anonymous: bool,
    },

    /// Show the sync checkpoint and pending mutation counts
    Status {
        #[arg(long, value_name = "file")]
        config: PathBuf,

        #[arg(long, value_name = "id", value_parser = non_empty_string)]
        user: String,
    },

    /// Write a default config file
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
