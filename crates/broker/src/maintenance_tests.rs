// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dispatch::fake::FakeDispatcher;
use crate::dispatch::Dispatcher;
use crate::engine::{Engine, EngineConfig};
use crate::recovery::STUCK_REASON;
use proctor_core::{read_json_opt, FailureRecord, ProcessingState, ProcessingStatus, SystemClock};
use serde_json::{json, Value};

struct Harness {
    _dir: tempfile::TempDir,
    maintenance: Maintenance<SystemClock>,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn setup() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    layout.ensure().unwrap();
    let store = Arc::new(StateStore::load(layout.state_file(), Utc::now()));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(FakeDispatcher::new());
    let cancel = CancellationToken::new();
    let (shutdown_tx, _shutdown_rx) = tokio::sync::mpsc::channel(1);
    let engine = Engine::new(
        layout.clone(),
        Arc::clone(&store),
        dispatcher,
        SystemClock,
        EngineConfig::default(),
        cancel.clone(),
        shutdown_tx,
    );
    let handle = engine.handle();
    tokio::spawn(engine.run());
    Harness {
        maintenance: Maintenance {
            writer: ResponseWriter::new(layout.clone()),
            layout,
            store,
            engine: handle,
            clock: SystemClock,
            interval: Duration::from_secs(30),
            started: std::time::Instant::now(),
        },
        _dir: dir,
        cancel,
    }
}

fn aged_state(id: &str, status: ProcessingStatus, age: ChronoDuration) -> ProcessingState {
    let then = Utc::now() - age;
    let mut state = ProcessingState::new(id, then);
    state.transition(status, then);
    state
}

#[tokio::test]
async fn tick_garbage_collects_old_completed_states() {
    let h = setup();
    let m = &h.maintenance;
    m.store.insert(aged_state("old", ProcessingStatus::Completed, ChronoDuration::hours(2))).unwrap();
    m.store.insert(aged_state("new", ProcessingStatus::Completed, ChronoDuration::minutes(5))).unwrap();

    m.tick().await;
    assert!(m.store.get("old").is_none());
    assert!(m.store.get("new").is_some());
}

#[tokio::test]
async fn tick_force_fails_stuck_claims() {
    let h = setup();
    let m = &h.maintenance;
    m.store
        .insert(aged_state("stuck", ProcessingStatus::Processing, ChronoDuration::minutes(15)))
        .unwrap();
    std::fs::write(
        m.layout.processing_path("stuck"),
        serde_json::to_vec(&json!({
            "request_id": "stuck",
            "command": "ping",
            "params": {},
            "timestamp": Utc::now() - ChronoDuration::minutes(15),
        }))
        .unwrap(),
    )
    .unwrap();

    m.tick().await;

    let record: FailureRecord = read_json_opt(&m.layout.failed_path("stuck")).unwrap();
    assert_eq!(record.failure_reason, STUCK_REASON);
    assert!(!m.layout.processing_path("stuck").exists());
    assert_eq!(m.store.get("stuck").map(|s| s.status), Some(ProcessingStatus::Failed));
}

#[tokio::test]
async fn tick_leaves_recent_processing_alone() {
    let h = setup();
    let m = &h.maintenance;
    m.store
        .insert(aged_state("active", ProcessingStatus::Processing, ChronoDuration::minutes(2)))
        .unwrap();

    m.tick().await;
    assert_eq!(m.store.get("active").map(|s| s.status), Some(ProcessingStatus::Processing));
    assert!(!m.layout.failed_path("active").exists());
}

#[tokio::test]
async fn tick_publishes_the_advisory_snapshot() {
    let h = setup();
    let m = &h.maintenance;
    m.store.insert(aged_state("a", ProcessingStatus::Retry, ChronoDuration::minutes(1))).unwrap();

    m.tick().await;

    let snapshot: Value = read_json_opt(&m.layout.snapshot_file()).unwrap();
    assert_eq!(snapshot["pid"], std::process::id());
    assert_eq!(snapshot["base_directory"], m.layout.base().display().to_string());
    assert_eq!(snapshot["counts"]["retry"], 1);
    assert!(snapshot["version"].as_str().is_some());
    assert!(snapshot["updated_at"].as_str().is_some());
    assert!(snapshot["uptime_s"].as_f64().unwrap_or(-1.0) >= 0.0);
}

#[tokio::test]
async fn tick_rescans_requests_left_behind() {
    let h = setup();
    let m = &h.maintenance;
    std::fs::write(
        m.layout.request_path("missed"),
        serde_json::to_vec(&json!({
            "request_id": "missed",
            "command": "ping",
            "params": {},
            "timestamp": Utc::now(),
        }))
        .unwrap(),
    )
    .unwrap();

    m.tick().await;

    let path = m.layout.response_path("missed");
    for _ in 0..400 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("re-scan did not produce a response");
}
