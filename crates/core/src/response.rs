// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response documents the broker writes into `responses/` and `failed/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal outcome of a request. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Failed,
    Error,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Success => "success",
            FinalStatus::Failed => "failed",
            FinalStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatch attempt, in order. `attempt` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The terminal record for a request. Written exactly once per observed
/// request id (modulo deliberate client resubmission with a fresher
/// timestamp) and never partially visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub final_status: FinalStatus,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    /// Echo of the request's creation timestamp. Absent only when the
    /// request document was unparseable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_used: Option<String>,
    #[serde(default)]
    pub response_length: u64,
    #[serde(default)]
    pub execution_time_s: f64,
    /// Validation failures carry no attempts; the reason lives here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// A terminal `error` response for a request that never reached dispatch.
    pub fn validation_error(
        request_id: impl Into<String>,
        reason: impl Into<String>,
        request_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            final_status: FinalStatus::Error,
            attempts: Vec::new(),
            request_timestamp,
            model_used: None,
            mode_used: None,
            response_length: 0,
            execution_time_s: 0.0,
            error: Some(reason.into()),
        }
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }
}

/// The `failed/` mirror of a terminal failure, for post-mortem and manual
/// reprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(flatten)]
    pub response: Response,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
