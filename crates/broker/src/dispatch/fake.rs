// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted dispatcher for tests.
//!
//! Each `dispatch` call consumes one scripted outcome; an exhausted script
//! keeps succeeding. Mode-preamble `setMode` calls consume entries like any
//! other call, so scripts for mode-carrying prompts must account for them.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use proctor_core::{Command, Mode};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{Dispatcher, DispatcherError, DispatcherResult};

/// One scripted dispatch outcome
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Answer the command semantically
    Succeed,
    /// Return `success: false` with this error
    Fail(String),
    /// Raise instead of returning
    Raise(String),
    /// Wait for the cancel token, then report cancellation (a cooperative
    /// dispatcher that honors its deadline)
    Hang,
    /// Never return, even when cancelled (exercises the grace path)
    HangUncooperative,
}

/// Scripted [`Dispatcher`] with call recording.
pub struct FakeDispatcher {
    model: String,
    mode: Mutex<Mode>,
    script: Mutex<VecDeque<FakeOutcome>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Command>>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self {
            model: "fake-model".into(),
            mode: Mutex::new(Mode::Agent),
            script: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = FakeOutcome>) -> Self {
        let fake = Self::new();
        *fake.script.lock() = outcomes.into_iter().collect();
        fake
    }

    /// Sleep this long before resolving each call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Commands observed so far, in order
    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn answer(&self, command: &Command) -> DispatcherResult {
        let result = match command {
            Command::Ping => DispatcherResult::ok(json!({"message": "pong"})),
            Command::SetMode { mode } => {
                *self.mode.lock() = *mode;
                DispatcherResult::ok(json!({"mode": mode}))
            }
            Command::GetCurrentState => {
                DispatcherResult::ok(json!({"model": self.model, "mode": *self.mode.lock()}))
            }
            Command::SubmitPrompt { prompt, .. } => {
                DispatcherResult::ok(json!({"output": format!("fake: {prompt}")}))
            }
            Command::Shutdown => DispatcherResult::ok(json!({})),
        };
        result.with_model(self.model.clone()).with_mode(*self.mode.lock())
    }
}

impl Default for FakeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<DispatcherResult, DispatcherError> {
        self.calls.lock().push(command.clone());
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let outcome = self.script.lock().pop_front().unwrap_or(FakeOutcome::Succeed);
        match outcome {
            FakeOutcome::Succeed => Ok(self.answer(&command)),
            FakeOutcome::Fail(error) => Ok(DispatcherResult::fail(error)),
            FakeOutcome::Raise(error) => Err(DispatcherError::Other(error)),
            FakeOutcome::Hang => {
                cancel.cancelled().await;
                Err(DispatcherError::Cancelled)
            }
            FakeOutcome::HangUncooperative => {
                std::future::pending::<()>().await;
                Err(DispatcherError::Cancelled)
            }
        }
    }
}
