// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery of in-flight work.
//!
//! Claims left in `processing/` by a dead broker are either failed
//! terminally (stuck longer than the threshold) or re-enqueued as fresh
//! claims; then everything still sitting in `requests/` is submitted as if
//! watcher events had fired.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use proctor_core::{
    id_from_path, read_json_opt, Clock, FinalStatus, ProcessingState, ProcessingStatus, Response,
};
use tracing::{info, warn};

use crate::engine::{EngineError, EngineHandle};
use crate::layout::Layout;
use crate::respond::ResponseWriter;
use crate::store::StateStore;
use crate::watch;

/// Idle threshold after which a recovered claim is failed instead of
/// resumed.
pub fn stuck_threshold() -> ChronoDuration {
    ChronoDuration::minutes(5)
}

/// Reason recorded on claims failed by recovery and maintenance.
pub const STUCK_REASON: &str = "processing timeout during recovery";

/// What recovery did, for the startup log line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub failed: usize,
    pub enqueued: usize,
}

/// Run the two-pass recovery. Called after lock acquisition and state store
/// load, before the watcher starts.
pub async fn recover<C: Clock>(
    layout: &Layout,
    store: &StateStore,
    writer: &ResponseWriter,
    engine: &EngineHandle,
    clock: &C,
    stuck_after: ChronoDuration,
) -> Result<RecoveryReport, EngineError> {
    let now = clock.wall();
    let mut report = RecoveryReport::default();

    let mut claims: Vec<PathBuf> = std::fs::read_dir(layout.processing())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    claims.sort();

    for path in claims {
        let Some(id) = id_from_path(&path) else { continue };
        let state = store.get(&id);
        let stuck = state
            .as_ref()
            .map(|s| s.status == ProcessingStatus::Processing && now - s.last_update > stuck_after)
            .unwrap_or(false);

        if stuck {
            fail_stuck(layout, store, writer, &id, &path, now)?;
            report.failed += 1;
        } else {
            let request_path = layout.request_path(&id);
            if request_path.exists() {
                // a re-emitted retry already supersedes this claim
                let _ = std::fs::remove_file(&path);
            } else if let Err(e) = std::fs::rename(&path, &request_path) {
                warn!(request_id = %id, "failed to requeue claim: {e}");
                continue;
            }
            engine.submit(request_path).await;
            report.resumed += 1;
        }
    }

    report.enqueued = watch::scan_existing(layout, engine).await?;
    info!(
        resumed = report.resumed,
        failed = report.failed,
        enqueued = report.enqueued,
        "recovery pass complete"
    );
    Ok(report)
}

/// Fail a stuck claim terminally: response, `failed/` mirror, state, and
/// claim removal. Shared by recovery and the maintenance sweep.
pub(crate) fn fail_stuck(
    layout: &Layout,
    store: &StateStore,
    writer: &ResponseWriter,
    id: &str,
    processing_path: &Path,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let request_timestamp = read_json_opt::<serde_json::Value>(processing_path)
        .and_then(|doc| doc.get("timestamp").cloned())
        .and_then(|ts| serde_json::from_value::<DateTime<Utc>>(ts).ok());

    let mut state = store.get(id).unwrap_or_else(|| ProcessingState::new(id, now));
    let response = Response {
        request_id: id.to_string(),
        final_status: FinalStatus::Failed,
        attempts: state.attempts.clone(),
        request_timestamp,
        model_used: None,
        mode_used: None,
        response_length: 0,
        execution_time_s: state.elapsed_s(now),
        error: Some(STUCK_REASON.to_string()),
    };
    writer.write_failure(&response, STUCK_REASON, now)?;

    state.error_message = Some(STUCK_REASON.to_string());
    state.transition(ProcessingStatus::Failed, now);
    store.insert(state)?;

    if let Err(e) = std::fs::remove_file(processing_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(request_id = %id, "failed to remove stuck claim: {e}");
        }
    }
    warn!(request_id = %id, "failed stuck claim: {STUCK_REASON}");
    Ok(())
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
