// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! proctor: command-line client for the file-based evaluation broker.
//!
//! A thin collaborator: it drops request files into `requests/` and reads
//! response files out of `responses/`. The broker does everything else.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use proctor_broker::config::DEFAULT_BASE_DIR;
use proctor_core::FinalStatus;
use serde_json::json;

use crate::client::{Client, SubmitOptions};

#[derive(Parser)]
#[command(name = "proctor", version, about = "Client for the file-based evaluation broker")]
struct Cli {
    /// Base directory of the broker's directory interface
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct WaitArgs {
    /// Submit without waiting for the response file
    #[arg(long)]
    no_wait: bool,

    /// Seconds to wait for the response
    #[arg(long, default_value_t = 120)]
    wait_secs: u64,
}

#[derive(Subcommand)]
enum Cmd {
    /// Health-check the broker
    Ping {
        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Submit a prompt to the assistant
    Prompt {
        text: String,

        /// Assistant mode to apply first (agent or chat)
        #[arg(long)]
        mode: Option<String>,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Retry budget (0 means a single attempt)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Request id (defaults to a generated req_<uuid>)
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Switch the assistant mode
    SetMode {
        /// agent or chat
        mode: String,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Show the assistant's current model and mode
    State {
        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Show the broker's advisory status snapshot
    Status,

    /// Ask the broker to shut down
    Shutdown {
        #[command(flatten)]
        wait: WaitArgs,
    },
}

fn check_mode(mode: &str) -> anyhow::Result<()> {
    if mode != "agent" && mode != "chat" {
        bail!("mode must be \"agent\" or \"chat\", got {mode:?}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base_dir = cli
        .base_dir
        .or_else(proctor_broker::env::base_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR));
    let client = Client::new(base_dir);

    let (command, params, opts, wait) = match cli.command {
        Cmd::Ping { wait } => ("ping", json!({}), SubmitOptions::default(), wait),
        Cmd::Prompt { text, mode, timeout_ms, max_retries, id, wait } => {
            let mut params = json!({"prompt": text});
            if let Some(mode) = mode {
                check_mode(&mode)?;
                params["mode"] = json!(mode);
            }
            ("submitPrompt", params, SubmitOptions { id, timeout_ms, max_retries }, wait)
        }
        Cmd::SetMode { mode, wait } => {
            check_mode(&mode)?;
            ("setMode", json!({"mode": mode}), SubmitOptions::default(), wait)
        }
        Cmd::State { wait } => ("getCurrentState", json!({}), SubmitOptions::default(), wait),
        Cmd::Status => {
            let status = client.read_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        Cmd::Shutdown { wait } => ("shutdown", json!({}), SubmitOptions::default(), wait),
    };

    let id = client.submit(command, params, &opts)?;
    eprintln!("submitted {id}");
    if wait.no_wait {
        return Ok(());
    }

    let response = client.await_response(&id, Duration::from_secs(wait.wait_secs)).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.final_status != FinalStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
