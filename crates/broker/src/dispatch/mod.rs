// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher seam: how the broker executes a command.
//!
//! The broker does not know or care how a dispatcher talks to the model.
//! The only requirements are that `dispatch` eventually returns and that it
//! honors the cancel token at its next suspension point.

use async_trait::async_trait;
use parking_lot::Mutex;
use proctor_core::{Command, Mode};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

/// What a dispatch attempt produced. `success: false` is a retryable
/// failure with the reason in `error`.
#[derive(Debug, Clone, Default)]
pub struct DispatcherResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub model_used: Option<String>,
    pub mode_used: Option<String>,
}

impl DispatcherResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), ..Self::default() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Self::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode_used = Some(mode.as_str().to_string());
        self
    }
}

/// A raised (as opposed to returned) dispatch failure.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("dispatch cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Executes one command against the assistant.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<DispatcherResult, DispatcherError>;
}

/// Self-contained dispatcher used by the `proctord` binary so the directory
/// protocol can be driven end to end without an editor: answers `ping`,
/// `setMode`, and `getCurrentState` semantically and echoes prompts.
pub struct LoopbackDispatcher {
    model: String,
    mode: Mutex<Mode>,
}

impl LoopbackDispatcher {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), mode: Mutex::new(Mode::Agent) }
    }
}

impl Default for LoopbackDispatcher {
    fn default() -> Self {
        Self::new("loopback")
    }
}

#[async_trait]
impl Dispatcher for LoopbackDispatcher {
    async fn dispatch(
        &self,
        command: Command,
        _cancel: CancellationToken,
    ) -> Result<DispatcherResult, DispatcherError> {
        let result = match command {
            Command::Ping => DispatcherResult::ok(json!({"message": "pong"})),
            Command::SetMode { mode: next } => {
                *self.mode.lock() = next;
                DispatcherResult::ok(json!({"mode": next}))
            }
            Command::GetCurrentState => {
                DispatcherResult::ok(json!({"model": self.model, "mode": *self.mode.lock()}))
            }
            Command::SubmitPrompt { prompt, .. } => {
                DispatcherResult::ok(json!({"output": format!("echo: {prompt}")}))
            }
            // Handled by the broker before dispatch; answered here for
            // completeness.
            Command::Shutdown => DispatcherResult::ok(json!({})),
        };
        Ok(result.with_model(self.model.clone()).with_mode(*self.mode.lock()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
