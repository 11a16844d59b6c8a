// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request documents dropped into `requests/` by evaluation clients.
//!
//! Parsing is two-stage: the raw JSON shape first, then the command string
//! and its params are lifted into the closed [`Command`] sum. Unknown
//! commands and malformed params are validation errors, never dispatched.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Default per-attempt dispatch timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default retry budget; 0 means a single attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Assistant interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Agent,
    Chat,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Agent => "agent",
            Mode::Chat => "chat",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of commands the broker accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    SubmitPrompt {
        prompt: String,
        /// Optional mode applied via the dispatcher before the prompt call.
        mode: Option<Mode>,
    },
    SetMode {
        mode: Mode,
    },
    GetCurrentState,
    /// Handled by the broker itself: success response, then graceful exit.
    Shutdown,
}

impl Command {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::SubmitPrompt { .. } => "submitPrompt",
            Command::SetMode { .. } => "setMode",
            Command::GetCurrentState => "getCurrentState",
            Command::Shutdown => "shutdown",
        }
    }

    /// Lift a `(command, params)` pair into the closed sum.
    pub fn from_parts(command: &str, params: &Value) -> Result<Self, RequestError> {
        match command {
            "ping" => Ok(Command::Ping),
            "getCurrentState" => Ok(Command::GetCurrentState),
            "shutdown" => Ok(Command::Shutdown),
            "submitPrompt" => {
                let prompt = params
                    .get("prompt")
                    .and_then(Value::as_str)
                    .ok_or(RequestError::MissingParam { command: "submitPrompt", param: "prompt" })?
                    .to_string();
                let mode = match params.get("mode") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(parse_mode(v)?),
                };
                Ok(Command::SubmitPrompt { prompt, mode })
            }
            "setMode" => {
                let mode = params
                    .get("mode")
                    .ok_or(RequestError::MissingParam { command: "setMode", param: "mode" })?;
                Ok(Command::SetMode { mode: parse_mode(mode)? })
            }
            other => Err(RequestError::UnknownCommand(other.to_string())),
        }
    }

    /// Wire shape of the params object (used when re-emitting retries).
    pub fn params(&self) -> Value {
        match self {
            Command::Ping | Command::GetCurrentState | Command::Shutdown => json!({}),
            Command::SubmitPrompt { prompt, mode } => match mode {
                Some(m) => json!({ "prompt": prompt, "mode": m }),
                None => json!({ "prompt": prompt }),
            },
            Command::SetMode { mode } => json!({ "mode": mode }),
        }
    }
}

fn parse_mode(value: &Value) -> Result<Mode, RequestError> {
    serde_json::from_value(value.clone()).map_err(|_| RequestError::InvalidParam {
        param: "mode",
        detail: format!("expected \"agent\" or \"chat\", got {value}"),
    })
}

/// Validation failures while lifting a request document.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request_id must not be empty")]
    EmptyId,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("command {command:?} requires param {param:?}")]
    MissingParam { command: &'static str, param: &'static str },

    #[error("invalid value for param {param:?}: {detail}")]
    InvalidParam { param: &'static str, detail: String },
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    request_id: String,
    command: String,
    #[serde(default)]
    params: Value,
    timestamp: DateTime<Utc>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_count: Option<u32>,
}

/// A validated request. Client-authored and read-only to the broker, except
/// for `retry_count` and `timestamp` which the broker refreshes when it
/// re-emits a retry.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: String,
    pub command: Command,
    pub timestamp: DateTime<Utc>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_count: u32,
}

impl Request {
    /// Parse and validate a request document.
    pub fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
        let raw: RawRequest = serde_json::from_slice(bytes)?;
        if raw.request_id.is_empty() {
            return Err(RequestError::EmptyId);
        }
        let command = Command::from_parts(&raw.command, &raw.params)?;
        Ok(Self {
            request_id: raw.request_id,
            command,
            timestamp: raw.timestamp,
            timeout_ms: raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            max_retries: raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_count: raw.retry_count.unwrap_or(0),
        })
    }

    /// Client wire shape, used when the broker re-emits a retry.
    pub fn to_value(&self) -> Value {
        json!({
            "request_id": self.request_id,
            "command": self.command.name(),
            "params": self.command.params(),
            "timestamp": self.timestamp,
            "timeout_ms": self.timeout_ms,
            "max_retries": self.max_retries,
            "retry_count": self.retry_count,
        })
    }

    /// Per-attempt dispatch deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Derive the request id from a file name stem. Non-`.json` paths and
/// extension-less names yield `None`.
pub fn id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}

/// Strip the documented `req_` client prefix when deriving response names.
pub fn response_id(id: &str) -> &str {
    id.strip_prefix("req_").unwrap_or(id)
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
