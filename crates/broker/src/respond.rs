// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single path through which responses reach disk.
//!
//! Responses are written temp-and-rename so readers never observe a partial
//! document, and a response already on disk for a strictly fresher request
//! is never clobbered by a stale straggler.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use proctor_core::{read_json_opt, write_json_atomic, FailureRecord, Response, WriteError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::layout::Layout;

/// Response writer errors. When a response cannot be written at all the
/// engine logs at error level and leaves the request in `processing/` for
/// the next recovery cycle.
#[derive(Debug, Error)]
pub enum RespondError {
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: WriteError },
}

#[derive(Clone)]
pub struct ResponseWriter {
    layout: Layout,
}

impl ResponseWriter {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Write `responses/<id>.json`. Returns the path written, or `None`
    /// when a strictly fresher response already exists and the write was
    /// skipped.
    pub fn write(&self, response: &Response) -> Result<Option<PathBuf>, RespondError> {
        let path = self.layout.response_path(&response.request_id);
        if let Some(existing) = read_json_opt::<Response>(&path) {
            if existing.request_timestamp > response.request_timestamp {
                warn!(
                    request_id = %response.request_id,
                    "a fresher response already exists, skipping write"
                );
                return Ok(None);
            }
        }
        write_json_atomic(&path, response)
            .map_err(|source| RespondError::Write { path: path.clone(), source })?;
        debug!(request_id = %response.request_id, status = %response.final_status, "response written");
        Ok(Some(path))
    }

    /// Write the response and mirror it into `failed/` with the failure
    /// reason for post-mortem and manual reprocessing.
    pub fn write_failure(
        &self,
        response: &Response,
        failure_reason: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<(), RespondError> {
        self.write(response)?;
        let record = FailureRecord {
            response: response.clone(),
            failure_reason: failure_reason.to_string(),
            failed_at,
        };
        let path = self.layout.failed_path(&response.request_id);
        write_json_atomic(&path, &record)
            .map_err(|source| RespondError::Write { path: path.clone(), source })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "respond_tests.rs"]
mod tests;
