// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request watcher: filesystem events in, engine submissions out.
//!
//! Events are hints, not truths. Every event waits a short settle delay
//! (so the client finishes writing), re-checks existence, and defers
//! everything else to the engine, which owns claiming and deletion. The
//! native watcher is preferred; a poll watcher takes over at the configured
//! interval when native watch is unavailable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::layout::Layout;

/// Delay between an event and the existence re-check, letting the client
/// finish its write.
pub const SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Watcher errors are fatal at startup: a broker that cannot observe
/// `requests/` must not pretend to be active.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Notify { path: PathBuf, source: notify::Error },
}

#[derive(Debug)]
enum WatchBackend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Holds the watch backend and the forwarding task for the broker's
/// lifetime.
#[derive(Debug)]
pub struct RequestWatcher {
    _backend: WatchBackend,
    task: JoinHandle<()>,
}

impl RequestWatcher {
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Start watching `requests/` and forwarding candidate files to the engine.
pub fn spawn(
    layout: &Layout,
    engine: EngineHandle,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> Result<RequestWatcher, WatchError> {
    let requests = layout.requests();
    let (tx, rx) = mpsc::channel::<PathBuf>(256);

    let backend = match RecommendedWatcher::new(
        event_handler(tx.clone()),
        notify::Config::default(),
    ) {
        Ok(mut watcher) => {
            watcher
                .watch(&requests, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Notify { path: requests.clone(), source })?;
            WatchBackend::Native(watcher)
        }
        Err(e) => {
            info!("native filesystem watch unavailable ({e}), falling back to polling");
            let config = notify::Config::default()
                .with_poll_interval(poll_interval)
                .with_compare_contents(false);
            let mut watcher = PollWatcher::new(event_handler(tx), config)
                .map_err(|source| WatchError::Notify { path: requests.clone(), source })?;
            watcher
                .watch(&requests, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Notify { path: requests.clone(), source })?;
            WatchBackend::Poll(watcher)
        }
    };

    let task = tokio::spawn(forward(rx, engine, shutdown));
    Ok(RequestWatcher { _backend: backend, task })
}

/// Notify callback: filter for `.json` creations and renames, hand paths to
/// the forwarding task.
fn event_handler(
    tx: mpsc::Sender<PathBuf>,
) -> impl Fn(Result<notify::Event, notify::Error>) + Send + 'static {
    move |result| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!("watch error: {e}");
                return;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any
        ) {
            return;
        }
        for path in event.paths {
            if is_request_file(&path) {
                // dropped sends are fine; the maintenance re-scan will
                // pick the file up
                let _ = tx.blocking_send(path);
            }
        }
    }
}

fn is_request_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

async fn forward(
    mut rx: mpsc::Receiver<PathBuf>,
    engine: EngineHandle,
    shutdown: CancellationToken,
) {
    loop {
        let path = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(path) => path,
                None => break,
            },
        };

        tokio::time::sleep(SETTLE_DELAY).await;
        if !path.exists() {
            debug!(path = %path.display(), "event path gone after settle, ignoring");
            continue;
        }
        engine.submit(path).await;
    }
}

/// Enumerate files already sitting in `requests/`, oldest name first, and
/// submit them. Run at startup so requests written while the broker was
/// down are not lost.
pub async fn scan_existing(layout: &Layout, engine: &EngineHandle) -> std::io::Result<usize> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(layout.requests())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_request_file(path))
        .collect();
    paths.sort();
    let found = paths.len();
    for path in paths {
        engine.submit(path).await;
    }
    Ok(found)
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
