// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-based client for the broker's directory interface.
//!
//! The client only ever writes into `requests/` (atomically, like every
//! other writer of the interface) and reads from `responses/` and
//! `config/`. Partial or absent documents read as "not yet".

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _};
use chrono::Utc;
use notify::{RecursiveMode, Watcher as _};
use proctor_broker::Layout;
use proctor_core::{read_json_opt, write_json_atomic, Response};
use serde_json::{json, Value};
use uuid::Uuid;

/// Poll slice while waiting on a response; watch events wake us earlier.
const WAIT_SLICE: Duration = Duration::from_millis(200);

/// Optional request fields
#[derive(Debug, Default, Clone)]
pub struct SubmitOptions {
    pub id: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

pub struct Client {
    layout: Layout,
}

impl Client {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { layout: Layout::new(base_dir) }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Write `requests/<id>.json` atomically. Returns the request id.
    pub fn submit(
        &self,
        command: &str,
        params: Value,
        opts: &SubmitOptions,
    ) -> anyhow::Result<String> {
        let id = opts.id.clone().unwrap_or_else(|| format!("req_{}", Uuid::new_v4()));
        let mut doc = json!({
            "request_id": id,
            "command": command,
            "params": params,
            "timestamp": Utc::now(),
        });
        if let Some(map) = doc.as_object_mut() {
            if let Some(timeout_ms) = opts.timeout_ms {
                map.insert("timeout_ms".into(), json!(timeout_ms));
            }
            if let Some(max_retries) = opts.max_retries {
                map.insert("max_retries".into(), json!(max_retries));
            }
        }

        std::fs::create_dir_all(self.layout.requests())
            .with_context(|| format!("cannot create {}", self.layout.requests().display()))?;
        let path = self.layout.request_path(&id);
        write_json_atomic(&path, &doc)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(id)
    }

    /// Wait for `responses/<id>.json` to appear, watching the responses
    /// directory and polling as a fallback.
    pub async fn await_response(&self, id: &str, timeout: Duration) -> anyhow::Result<Response> {
        let path = self.layout.response_path(id);
        let deadline = tokio::time::Instant::now() + timeout;

        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if res.is_ok() {
                let _ = tx.blocking_send(());
            }
        })
        .context("cannot create response watcher")?;
        // the directory may not exist until the broker starts; fall back to
        // pure polling in that case
        let _ = watcher.watch(&self.layout.responses(), RecursiveMode::NonRecursive);

        loop {
            if let Some(response) = read_json_opt::<Response>(&path) {
                return Ok(response);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                bail!("timed out waiting for {}", path.display());
            }
            let slice = WAIT_SLICE.min(deadline - now);
            let _ = tokio::time::timeout(slice, rx.recv()).await;
        }
    }

    /// Read the advisory broker snapshot, if the broker has published one.
    pub fn read_status(&self) -> anyhow::Result<Value> {
        read_json_opt::<Value>(&self.layout.snapshot_file())
            .with_context(|| format!("no broker snapshot at {}", self.layout.snapshot_file().display()))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
