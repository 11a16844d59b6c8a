// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker-owned durable record of where a request is in its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::Attempt;

/// Lifecycle position of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Retry,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Retry => "retry",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable per-request state, persisted in `state/processing_state.json`.
///
/// Carries the accumulated attempt log so the per-attempt history survives
/// retries and broker restarts; the final response is assembled from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    pub request_id: String,
    pub status: ProcessingStatus,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
}

impl ProcessingState {
    pub fn new(request_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ProcessingStatus::Pending,
            start_time: now,
            last_update: now,
            retry_count: 0,
            error_message: None,
            attempts: Vec::new(),
        }
    }

    /// Move to `status`, refreshing `last_update`.
    pub fn transition(&mut self, status: ProcessingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_update = now;
    }

    /// Elapsed wall time from first claim, in seconds.
    pub fn elapsed_s(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds().max(0) as f64 / 1000.0
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
