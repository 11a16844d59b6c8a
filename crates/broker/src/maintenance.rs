// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic housekeeping: completed-state GC, stuck-claim force-fail, the
//! advisory snapshot, and a `requests/` re-scan as a watch-event safety
//! net.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use proctor_core::{write_json_atomic, Clock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{clamp_duration, MAINTENANCE_INTERVAL_BOUNDS};
use crate::engine::EngineHandle;
use crate::env;
use crate::layout::Layout;
use crate::recovery;
use crate::respond::ResponseWriter;
use crate::store::{StateStore, StatusCounts};

/// Completed states older than this are garbage collected.
pub fn completed_retention() -> ChronoDuration {
    ChronoDuration::hours(1)
}

/// `processing` states idle longer than this are force-failed.
pub fn stuck_after() -> ChronoDuration {
    ChronoDuration::minutes(10)
}

/// The advisory snapshot published to `config/current_state.json`.
#[derive(Debug, Serialize)]
pub struct SnapshotDoc<'a> {
    pub version: &'a str,
    pub pid: u32,
    pub base_directory: &'a str,
    pub uptime_s: f64,
    pub counts: StatusCounts,
    pub updated_at: DateTime<Utc>,
}

pub struct Maintenance<C: Clock> {
    pub layout: Layout,
    pub store: Arc<StateStore>,
    pub writer: ResponseWriter,
    pub engine: EngineHandle,
    pub clock: C,
    pub interval: Duration,
    /// Monotonic broker start time, for the snapshot's uptime
    pub started: std::time::Instant,
}

impl<C: Clock> Maintenance<C> {
    /// Spawn the loop. The first tick runs immediately so the snapshot is
    /// published as soon as the broker is active.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = self.interval;
            loop {
                self.tick().await;
                // the interval may be adjusted on a running broker
                if let Some(next) = env::maintenance_interval() {
                    interval = clamp_duration(next, MAINTENANCE_INTERVAL_BOUNDS);
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }

    pub async fn tick(&self) {
        let now = self.clock.wall();

        match self.store.gc_completed(completed_retention(), now) {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "garbage collected completed states"),
            Err(e) => warn!("state GC failed: {e}"),
        }

        for state in self.store.stale_processing(stuck_after(), now) {
            // a live worker still owns this id; its own timeout will fire
            if self.engine.is_tracked(&state.request_id) {
                continue;
            }
            let path = self.layout.processing_path(&state.request_id);
            if let Err(e) = recovery::fail_stuck(
                &self.layout,
                &self.store,
                &self.writer,
                &state.request_id,
                &path,
                now,
            ) {
                warn!(request_id = %state.request_id, "failed to fail stuck claim: {e}");
            }
        }

        self.publish_snapshot(now);

        // watch events are hints; sweep up anything they missed
        if let Err(e) = crate::watch::scan_existing(&self.layout, &self.engine).await {
            warn!("request re-scan failed: {e}");
        }
    }

    fn publish_snapshot(&self, now: DateTime<Utc>) {
        let base = self.layout.base().display().to_string();
        let doc = SnapshotDoc {
            version: env::BROKER_VERSION,
            pid: std::process::id(),
            base_directory: &base,
            uptime_s: self.clock.now().duration_since(self.started).as_secs_f64(),
            counts: self.store.counts(),
            updated_at: now,
        };
        if let Err(e) = write_json_atomic(&self.layout.snapshot_file(), &doc) {
            warn!("failed to publish state snapshot: {e}");
        }
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
