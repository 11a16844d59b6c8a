// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! proctord: the standalone broker binary.
//!
//! Serves the directory interface with the built-in loopback dispatcher so
//! clients can be driven end to end without an editor. Embedders construct
//! [`proctor_broker::Broker`] with their own dispatcher instead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use proctor_broker::{env, Broker, BrokerError, Config, Dispatcher, Layout, LoopbackDispatcher};

#[derive(Parser)]
#[command(name = "proctord", version = env::BROKER_VERSION, about = "File-based evaluation broker")]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the base directory
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Start even when autoStart is disabled
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("proctord: {e}");
            std::process::exit(2);
        }
    };
    if let Some(base) = args.base_dir {
        config.base_dir = base;
    }

    let layout = Layout::new(config.base_dir.clone());
    if let Err(e) = layout.ensure() {
        eprintln!("proctord: cannot create {}: {e}", layout.base().display());
        std::process::exit(1);
    }
    let _log_guard = init_tracing(&config, &layout);

    if !config.auto_start && !args.force {
        info!("autoStart is disabled; exiting (use --force to override)");
        return;
    }

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(LoopbackDispatcher::default());
    let mut broker = match Broker::start(config, dispatcher).await {
        Ok(broker) => broker,
        Err(BrokerError::LockDenied { owner_pid }) => {
            eprintln!("proctord: workspace is already served by pid {owner_pid}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("proctord: startup failed: {e}");
            std::process::exit(1);
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("cannot listen for SIGTERM: {e}");
            None
        }
    };
    let terminate = async {
        match sigterm.as_mut() {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = broker.wait_for_shutdown_command() => info!("shutdown command received"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = terminate => info!("terminate received"),
    }
    broker.shutdown().await;
}

/// System log: env-filtered, mirrored to stderr and `logs/system.log`.
fn init_tracing(
    config: &Config,
    layout: &Layout,
) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = env::log_filter().unwrap_or_else(|| config.log_level.as_filter().to_string());
    let appender = tracing_appender::rolling::never(layout.logs(), "system.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    guard
}
