// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable `request_id -> ProcessingState` map.
//!
//! Persisted as a single JSON document in `state/processing_state.json`,
//! written atomically after every transition. A corrupt document is archived
//! to a timestamped sibling and the store starts empty; the recovery pass
//! rebuilds in-flight work from the `processing/` directory.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use proctor_core::{write_json_atomic, ProcessingState, ProcessingStatus, WriteError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist state to {path}: {source}")]
    Persist { path: PathBuf, source: WriteError },
}

/// Counts by lifecycle status, published in the advisory snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub retry: usize,
    pub completed: usize,
    pub failed: usize,
}

/// The durable state map. Mutations persist before returning; the map mutex
/// is held across the write so transitions serialize.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, ProcessingState>>,
}

impl StateStore {
    /// Load the store, archiving a corrupt document instead of failing.
    pub fn load(path: PathBuf, now: DateTime<Utc>) -> Self {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, ProcessingState>>(&bytes) {
                Ok(map) => {
                    info!(entries = map.len(), "loaded processing state");
                    map
                }
                Err(e) => {
                    let archive =
                        PathBuf::from(format!("{}.corrupt.{}", path.display(), now.timestamp_millis()));
                    warn!(
                        archive = %archive.display(),
                        "processing state is corrupt ({e}), archiving and starting empty"
                    );
                    if let Err(e) = std::fs::rename(&path, &archive) {
                        warn!("failed to archive corrupt state file: {e}");
                    }
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), "failed to read processing state ({e}), starting empty");
                HashMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn get(&self, id: &str) -> Option<ProcessingState> {
        self.entries.lock().get(id).cloned()
    }

    /// Upsert a state record and persist.
    pub fn insert(&self, state: ProcessingState) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(state.request_id.clone(), state);
        self.persist_locked(&entries)
    }

    /// Remove `completed` entries older than `retention`. Returns how many
    /// were dropped.
    pub fn gc_completed(
        &self,
        retention: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, s| {
            s.status != ProcessingStatus::Completed || now - s.last_update <= retention
        });
        let removed = before - entries.len();
        if removed > 0 {
            self.persist_locked(&entries)?;
        }
        Ok(removed)
    }

    /// `processing` entries idle longer than `idle`.
    pub fn stale_processing(&self, idle: ChronoDuration, now: DateTime<Utc>) -> Vec<ProcessingState> {
        self.entries
            .lock()
            .values()
            .filter(|s| s.status == ProcessingStatus::Processing && now - s.last_update > idle)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let entries = self.entries.lock();
        let mut counts = StatusCounts::default();
        for state in entries.values() {
            match state.status {
                ProcessingStatus::Pending => counts.pending += 1,
                ProcessingStatus::Processing => counts.processing += 1,
                ProcessingStatus::Retry => counts.retry += 1,
                ProcessingStatus::Completed => counts.completed += 1,
                ProcessingStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Persist the current map (used at shutdown).
    pub fn persist(&self) -> Result<(), StoreError> {
        let entries = self.entries.lock();
        self.persist_locked(&entries)
    }

    fn persist_locked(&self, entries: &HashMap<String, ProcessingState>) -> Result<(), StoreError> {
        write_json_atomic(&self.path, entries)
            .map_err(|source| StoreError::Persist { path: self.path.clone(), source })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
