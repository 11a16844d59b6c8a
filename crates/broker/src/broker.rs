// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker assembly: startup, heartbeat, cooperative shutdown.

use std::sync::Arc;
use std::time::Duration;

use proctor_core::{Clock, SystemClock, WorkspaceId};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::engine::{Engine, EngineConfig, EngineError, EngineHandle};
use crate::layout::Layout;
use crate::lock::{Acquire, LockError, LockManager, HEARTBEAT_INTERVAL};
use crate::maintenance::Maintenance;
use crate::recovery;
use crate::respond::ResponseWriter;
use crate::store::StateStore;
use crate::watch::{self, RequestWatcher, WatchError};

/// Startup failures. Lock contention is the one the user sees directly.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("another broker owns this workspace (pid {owner_pid})")]
    LockDenied { owner_pid: u32 },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A running broker. Dropping it abandons the background tasks; call
/// [`Broker::shutdown`] for the graceful path.
#[derive(Debug)]
pub struct Broker<C: Clock = SystemClock> {
    config: Config,
    layout: Layout,
    lock: Arc<LockManager>,
    store: Arc<StateStore>,
    handle: EngineHandle,
    cancel: CancellationToken,
    engine_task: JoinHandle<()>,
    watcher: RequestWatcher,
    heartbeat_task: JoinHandle<()>,
    maintenance_task: JoinHandle<()>,
    shutdown_rx: mpsc::Receiver<()>,
    shutdown_grace: Duration,
    clock: C,
}

impl Broker<SystemClock> {
    pub async fn start(
        config: Config,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, BrokerError> {
        Self::start_with_clock(config, dispatcher, SystemClock).await
    }
}

impl<C: Clock> Broker<C> {
    pub async fn start_with_clock(
        config: Config,
        dispatcher: Arc<dyn Dispatcher>,
        clock: C,
    ) -> Result<Self, BrokerError> {
        // 1. Directory layout
        let layout = Layout::new(config.base_dir.clone());
        layout.ensure()?;

        // 2. Singleton lock, before touching any broker-owned state
        let workspace = WorkspaceId::from_root(layout.base());
        let lock = Arc::new(LockManager::new(&layout, &workspace));
        match lock.acquire()? {
            Acquire::Acquired => {}
            Acquire::Denied { owner_pid } => {
                return Err(BrokerError::LockDenied { owner_pid });
            }
        }

        // 3. Durable state
        let store = Arc::new(StateStore::load(layout.state_file(), clock.wall()));

        // 4. Lifecycle engine
        let cancel = CancellationToken::new();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let engine_cfg = EngineConfig::from_config(&config);
        let shutdown_grace = engine_cfg.shutdown_grace;
        let engine = Engine::new(
            layout.clone(),
            Arc::clone(&store),
            dispatcher,
            clock.clone(),
            engine_cfg,
            cancel.child_token(),
            shutdown_tx,
        );
        let handle = engine.handle();
        let engine_task = tokio::spawn(engine.run());

        // 5. Recover in-flight claims, then enqueue the request backlog
        let writer = ResponseWriter::new(layout.clone());
        recovery::recover(
            &layout,
            &store,
            &writer,
            &handle,
            &clock,
            recovery::stuck_threshold(),
        )
        .await?;

        // 6. Watch for new requests
        let watcher =
            watch::spawn(&layout, handle.clone(), config.polling_interval, cancel.child_token())?;

        // 7. Lock heartbeat
        let heartbeat_task = spawn_heartbeat(Arc::clone(&lock), cancel.child_token());

        // 8. Maintenance; its first tick publishes the advisory snapshot
        let maintenance_task = Maintenance {
            layout: layout.clone(),
            store: Arc::clone(&store),
            writer,
            engine: handle.clone(),
            started: clock.now(),
            clock: clock.clone(),
            interval: config.maintenance_interval,
        }
        .spawn(cancel.child_token());

        info!(
            base = %layout.base().display(),
            workspace = %workspace,
            "broker active"
        );

        Ok(Self {
            config,
            layout,
            lock,
            store,
            handle,
            cancel,
            engine_task,
            watcher,
            heartbeat_task,
            maintenance_task,
            shutdown_rx,
            shutdown_grace,
            clock,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Resolve when a `shutdown` command arrives through the directory
    /// interface.
    pub async fn wait_for_shutdown_command(&mut self) {
        let _ = self.shutdown_rx.recv().await;
    }

    /// Graceful shutdown: stop the watcher, cancel in-flight dispatches,
    /// drain within the grace, persist state, release the lock. Claims
    /// still in `processing/` are recovered on next start.
    pub async fn shutdown(self) {
        info!("shutting down broker");
        self.cancel.cancel();
        self.watcher.stop().await;

        let grace = self.shutdown_grace + Duration::from_secs(1);
        if tokio::time::timeout(grace, self.engine_task).await.is_err() {
            warn!("engine did not drain within the shutdown grace");
        }
        let _ = self.heartbeat_task.await;
        let _ = self.maintenance_task.await;

        if let Err(e) = self.store.persist() {
            warn!("failed to persist state at shutdown: {e}");
        }
        self.lock.release();
        info!("broker shutdown complete");
    }
}

fn spawn_heartbeat(lock: Arc<LockManager>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    if let Err(e) = lock.heartbeat() {
                        warn!("lock heartbeat failed: {e}");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
