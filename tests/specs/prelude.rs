// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end specs.

pub use std::path::PathBuf;
pub use std::sync::Arc;
pub use std::time::Duration;

pub use chrono::{Duration as ChronoDuration, Utc};
pub use proctor_broker::{
    Broker, BrokerError, Config, Dispatcher, FakeDispatcher, FakeOutcome, Layout,
};
pub use proctor_core::{
    read_json_opt, FailureRecord, FinalStatus, ProcessingState, ProcessingStatus, Response,
    WorkspaceId,
};
pub use serde_json::{json, Value};

/// One isolated broker base directory.
pub struct Bench {
    _dir: tempfile::TempDir,
    pub layout: Layout,
}

impl Bench {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure().unwrap();
        Self { _dir: dir, layout }
    }

    pub fn config(&self) -> Config {
        Config { base_dir: self.layout.base().to_path_buf(), ..Config::default() }
    }

    pub async fn start(&self, dispatcher: &Arc<FakeDispatcher>) -> Broker {
        let dyn_dispatcher: Arc<dyn Dispatcher> = Arc::clone(dispatcher) as Arc<dyn Dispatcher>;
        Broker::start(self.config(), dyn_dispatcher).await.unwrap()
    }

    /// Drop a request file the way a client would.
    pub fn write_request(&self, id: &str, doc: &Value) {
        std::fs::write(
            self.layout.request_path(id),
            serde_json::to_vec_pretty(doc).unwrap(),
        )
        .unwrap();
    }

    /// Seed a `processing/` claim, as left behind by a dead broker.
    pub fn write_claim(&self, id: &str, doc: &Value) {
        std::fs::write(
            self.layout.processing_path(id),
            serde_json::to_vec_pretty(doc).unwrap(),
        )
        .unwrap();
    }

    /// Seed the durable state map directly, as a previous incarnation would
    /// have persisted it.
    pub fn write_state(&self, states: &[ProcessingState]) {
        let map: std::collections::HashMap<&str, &ProcessingState> =
            states.iter().map(|s| (s.request_id.as_str(), s)).collect();
        std::fs::write(
            self.layout.state_file(),
            serde_json::to_vec_pretty(&map).unwrap(),
        )
        .unwrap();
    }

    pub async fn wait_response(&self, id: &str) -> Response {
        let path = self.layout.response_path(id);
        for _ in 0..1500 {
            if let Some(response) = read_json_opt::<Response>(&path) {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no response for {id} within deadline");
    }

    pub async fn wait_gone(&self, path: PathBuf) {
        for _ in 0..500 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} still present after deadline", path.display());
    }
}

pub fn ping_doc(id: &str) -> Value {
    json!({
        "request_id": id,
        "command": "ping",
        "params": {},
        "timestamp": Utc::now(),
    })
}

pub fn doc_with(id: &str, extra: Value) -> Value {
    let mut doc = ping_doc(id);
    if let (Some(map), Some(extra_map)) = (doc.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_map {
            map.insert(k.clone(), v.clone());
        }
    }
    doc
}

pub fn processing_state(id: &str, status: ProcessingStatus, idle: ChronoDuration) -> ProcessingState {
    let then = Utc::now() - idle;
    let mut state = ProcessingState::new(id, then);
    state.transition(status, then);
    state
}
