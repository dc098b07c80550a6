// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "seeq",
    about = "Streaming text-to-SQL client with incremental response reconciliation",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Natural-language query to send to the backend
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Backend websocket URL (overrides config), e.g. "ws://127.0.0.1:8000/ws"
    #[arg(long, short = 'u', env = "SEEQ_URL")]
    pub url: Option<String>,

    /// Bearer token for the websocket upgrade (overrides config)
    #[arg(long, env = "SEEQ_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Auto-approve feedback checkpoints (unattended runs)
    #[arg(long, short = 'y')]
    pub approve: bool,

    /// Print the final channel snapshots as JSON instead of formatted text
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration and exit
    ShowConfig,
}

impl Cli {
    /// Feedback prompts can only be answered interactively when stdin is a
    /// terminal; otherwise unattended behaviour applies.
    pub fn is_interactive(&self) -> bool {
        !self.approve && stdin_is_tty()
    }
}

fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::isatty(std::io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
