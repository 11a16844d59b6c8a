// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request lifecycle engine.
//!
//! For each claimed request file: validate, claim (rename into
//! `processing/`), dispatch with a deadline-armed cancel token, then either
//! write the success response, re-emit a retry, or fail terminally. The
//! engine is the sole owner of request-file deletion.
//!
//! An in-memory tracked set guards each id from the moment it is queued
//! until its terminal outcome or retry emission, so duplicate watcher
//! events and concurrent claims on the same id are no-ops. Per-id attempts
//! are therefore strictly sequential; across ids no order is promised.

pub(crate) mod validate;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use proctor_core::{
    id_from_path, read_json_opt, write_json_atomic, Attempt, Clock, Command, FinalStatus,
    ProcessingState, ProcessingStatus, Request, Response, WriteError,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::{Dispatcher, DispatcherError, DispatcherResult};
use crate::layout::Layout;
use crate::reqlog;
use crate::respond::{RespondError, ResponseWriter};
use crate::store::{StateStore, StoreError};

/// Engine tuning. Defaults match the documented constants.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrency cap; submissions beyond it queue FIFO
    pub max_concurrent: usize,
    /// Tolerated clock skew for future-dated timestamps
    pub timestamp_skew: ChronoDuration,
    /// Requests older than this are rejected
    pub max_request_age: ChronoDuration,
    /// Linear backoff step (times the new retry count)
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
    /// Extra wait past the deadline for a cancelled dispatcher to return
    pub dispatch_grace: Duration,
    /// Bounded drain on shutdown
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timestamp_skew: ChronoDuration::seconds(120),
            max_request_age: ChronoDuration::hours(24),
            backoff_step: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            dispatch_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self { max_concurrent: config.max_concurrent, ..Self::default() }
    }
}

/// Engine errors. These are logged, never propagated across the broker
/// boundary; a request whose response cannot be written stays in
/// `processing/` for the next recovery cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Respond(#[from] RespondError),

    #[error("failed to re-emit retry: {0}")]
    Write(#[from] WriteError),
}

struct Shared<C: Clock> {
    layout: Layout,
    store: Arc<StateStore>,
    writer: ResponseWriter,
    dispatcher: Arc<dyn Dispatcher>,
    clock: C,
    cfg: EngineConfig,
    tracked: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
    shutdown_requests: mpsc::Sender<()>,
}

/// Cloneable submission surface shared by the watcher, recovery, and
/// maintenance.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<PathBuf>,
    tracked: Arc<Mutex<HashSet<String>>>,
}

impl EngineHandle {
    /// Queue a candidate request file. Submissions for an id already queued
    /// or in flight are dropped; the claim there is authoritative.
    pub async fn submit(&self, path: PathBuf) {
        let Some(id) = id_from_path(&path) else { return };
        {
            let mut tracked = self.tracked.lock();
            if !tracked.insert(id.clone()) {
                debug!(request_id = %id, "already tracked, dropping submission");
                return;
            }
        }
        if self.tx.send(path).await.is_err() {
            self.tracked.lock().remove(&id);
        }
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracked.lock().contains(id)
    }
}

/// The lifecycle engine: a FIFO intake loop feeding a semaphore-capped
/// worker pool.
pub struct Engine<C: Clock> {
    shared: Arc<Shared<C>>,
    rx: mpsc::Receiver<PathBuf>,
    tx: mpsc::Sender<PathBuf>,
}

impl<C: Clock> Engine<C> {
    pub fn new(
        layout: Layout,
        store: Arc<StateStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: C,
        cfg: EngineConfig,
        cancel: CancellationToken,
        shutdown_requests: mpsc::Sender<()>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let shared = Arc::new(Shared {
            writer: ResponseWriter::new(layout.clone()),
            layout,
            store,
            dispatcher,
            clock,
            cfg,
            tracked: Arc::new(Mutex::new(HashSet::new())),
            cancel,
            shutdown_requests,
        });
        Self { shared, rx, tx }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { tx: self.tx.clone(), tracked: Arc::clone(&self.shared.tracked) }
    }

    /// Run until cancelled, then drain workers within the shutdown grace.
    pub async fn run(mut self) {
        let sem = Arc::new(Semaphore::new(self.shared.cfg.max_concurrent));
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                maybe = self.rx.recv() => {
                    let Some(path) = maybe else { break };
                    let permit = tokio::select! {
                        _ = self.shared.cancel.cancelled() => break,
                        permit = Arc::clone(&sem).acquire_owned() => match permit {
                            Ok(p) => p,
                            Err(_) => break,
                        },
                    };
                    workers.spawn(process(Arc::clone(&self.shared), path, permit));
                }
            }
        }

        // Bounded drain; anything still running is aborted and its claim is
        // recovered from `processing/` on next start.
        let drain = async {
            while workers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.shared.cfg.shutdown_grace, drain).await.is_err() {
            warn!("shutdown grace elapsed, aborting in-flight workers");
            workers.shutdown().await;
        }
    }
}

async fn process<C: Clock>(shared: Arc<Shared<C>>, path: PathBuf, permit: OwnedSemaphorePermit) {
    let Some(id) = id_from_path(&path) else { return };
    if let Err(e) = lifecycle(&shared, &id, &path, permit).await {
        error!(request_id = %id, "request lifecycle error: {e}");
    }
    shared.tracked.lock().remove(&id);
}

async fn lifecycle<C: Clock>(
    shared: &Arc<Shared<C>>,
    stem: &str,
    path: &Path,
    permit: OwnedSemaphorePermit,
) -> Result<(), EngineError> {
    // Step A: validate
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        // the file vanished between the event and the read; another event
        // already claimed it
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let now = shared.clock.wall();
    let request = match Request::parse(&bytes) {
        Ok(request) => request,
        Err(e) => return reject(shared, stem, None, &e.to_string(), path),
    };
    if let Err(reason) = validate::check(&request, stem, now, &shared.cfg) {
        return reject(shared, stem, Some(request.timestamp), &reason, path);
    }

    // Duplicate suppression: a strictly fresher response supersedes this
    // file, and a completed state means it was already answered.
    if let Some(existing) = read_json_opt::<Response>(&shared.layout.response_path(stem)) {
        if existing.request_timestamp > Some(request.timestamp) {
            debug!(request_id = %stem, "superseded by an existing response, dropping");
            remove_quiet(path);
            return Ok(());
        }
    }
    if shared.store.get(stem).is_some_and(|s| s.status == ProcessingStatus::Completed) {
        debug!(request_id = %stem, "already completed, dropping duplicate");
        remove_quiet(path);
        return Ok(());
    }

    // Step B: claim
    let processing = shared.layout.processing_path(stem);
    match std::fs::rename(path, &processing) {
        Ok(()) => {}
        // lost the claim race to another event
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    let mut state = match shared.store.get(stem) {
        Some(existing) if !existing.status.is_terminal() => existing,
        _ => ProcessingState::new(stem, now),
    };
    state.transition(ProcessingStatus::Processing, now);
    state.retry_count = request.retry_count;
    shared.store.insert(state.clone())?;
    reqlog::append(
        &shared.layout,
        stem,
        now,
        &format!("claimed {} (attempt {})", request.command.name(), request.retry_count + 1),
    );

    // Step C: bound client-authored retry counters. max_retries == 0 means
    // a single attempt, which still runs.
    if request.max_retries > 0 && request.retry_count >= request.max_retries {
        return fail_terminal(shared, &request, state, "max retries exceeded", &processing);
    }

    // The shutdown command is answered by the broker itself.
    if matches!(request.command, Command::Shutdown) {
        return finish_shutdown(shared, &request, state, &processing).await;
    }

    // Step D: dispatch
    let outcome = dispatch_with_deadline(shared, &request).await;
    let now = shared.clock.wall();
    if matches!(outcome, Err(DispatchFailure::Cancelled)) && shared.cancel.is_cancelled() {
        // shutdown interrupted the attempt; the claim stays in processing/
        // and is recovered on next start
        return Ok(());
    }

    let attempt_no = request.retry_count + 1;
    let attempt = match &outcome {
        Ok(result) if result.success => Attempt {
            attempt: attempt_no,
            success: true,
            data: result.data.clone(),
            error: None,
            timestamp: now,
        },
        Ok(result) => Attempt {
            attempt: attempt_no,
            success: false,
            data: None,
            error: Some(
                result.error.clone().unwrap_or_else(|| "dispatcher reported failure".to_string()),
            ),
            timestamp: now,
        },
        Err(failure) => Attempt {
            attempt: attempt_no,
            success: false,
            data: None,
            error: Some(failure.describe(&request)),
            timestamp: now,
        },
    };
    reqlog::append(
        &shared.layout,
        stem,
        now,
        &format!(
            "attempt {} {}",
            attempt.attempt,
            if attempt.success { "succeeded".to_string() } else { format!("failed: {}", attempt.error.as_deref().unwrap_or("?")) }
        ),
    );
    state.attempts.push(attempt);
    state.transition(ProcessingStatus::Processing, now);
    shared.store.insert(state.clone())?;

    match outcome {
        Ok(result) if result.success => finish_success(shared, &request, state, result, &processing),
        _ => retry_or_fail(shared, &request, state, permit, &processing).await,
    }
}

/// Terminal `error` response for a request that never reached dispatch.
fn reject<C: Clock>(
    shared: &Arc<Shared<C>>,
    stem: &str,
    request_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    reason: &str,
    path: &Path,
) -> Result<(), EngineError> {
    info!(request_id = %stem, "rejecting request: {reason}");
    let response = Response::validation_error(stem, reason, request_timestamp);
    shared.writer.write(&response)?;
    remove_quiet(path);
    reqlog::append(&shared.layout, stem, shared.clock.wall(), &format!("rejected: {reason}"));
    Ok(())
}

fn finish_success<C: Clock>(
    shared: &Arc<Shared<C>>,
    request: &Request,
    mut state: ProcessingState,
    result: DispatcherResult,
    processing: &Path,
) -> Result<(), EngineError> {
    let now = shared.clock.wall();
    let response = Response {
        request_id: request.request_id.clone(),
        final_status: FinalStatus::Success,
        attempts: state.attempts.clone(),
        request_timestamp: Some(request.timestamp),
        model_used: result.model_used,
        mode_used: result.mode_used,
        response_length: payload_len(result.data.as_ref()),
        execution_time_s: state.elapsed_s(now),
        error: None,
    };
    shared.writer.write(&response)?;
    state.transition(ProcessingStatus::Completed, now);
    shared.store.insert(state)?;
    remove_quiet(processing);
    info!(
        request_id = %request.request_id,
        attempts = response.attempts.len(),
        "request completed"
    );
    reqlog::append(&shared.layout, &request.request_id, now, "completed");
    Ok(())
}

fn fail_terminal<C: Clock>(
    shared: &Arc<Shared<C>>,
    request: &Request,
    mut state: ProcessingState,
    reason: &str,
    processing: &Path,
) -> Result<(), EngineError> {
    let now = shared.clock.wall();
    let response = Response {
        request_id: request.request_id.clone(),
        final_status: FinalStatus::Failed,
        attempts: state.attempts.clone(),
        request_timestamp: Some(request.timestamp),
        model_used: None,
        mode_used: None,
        response_length: 0,
        execution_time_s: state.elapsed_s(now),
        error: Some(reason.to_string()),
    };
    shared.writer.write_failure(&response, reason, now)?;
    state.error_message = Some(reason.to_string());
    state.transition(ProcessingStatus::Failed, now);
    shared.store.insert(state)?;
    remove_quiet(processing);
    warn!(request_id = %request.request_id, "request failed terminally: {reason}");
    reqlog::append(&shared.layout, &request.request_id, now, &format!("failed: {reason}"));
    Ok(())
}

/// Step F: re-emit with backoff while retries remain, else fail terminally.
async fn retry_or_fail<C: Clock>(
    shared: &Arc<Shared<C>>,
    request: &Request,
    mut state: ProcessingState,
    permit: OwnedSemaphorePermit,
    processing: &Path,
) -> Result<(), EngineError> {
    let next_retry = request.retry_count + 1;
    let reason = state
        .attempts
        .last()
        .and_then(|a| a.error.clone())
        .unwrap_or_else(|| "dispatch failed".to_string());

    if next_retry < request.max_retries {
        let now = shared.clock.wall();
        state.retry_count = next_retry;
        state.transition(ProcessingStatus::Retry, now);
        shared.store.insert(state)?;

        // free the concurrency slot for the duration of the backoff
        drop(permit);
        let backoff = shared
            .cfg
            .backoff_step
            .checked_mul(next_retry)
            .map(|d| d.min(shared.cfg.backoff_cap))
            .unwrap_or(shared.cfg.backoff_cap);
        tokio::select! {
            // recovery will re-run the claim from processing/
            _ = shared.cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(backoff) => {}
        }

        let mut retry = request.clone();
        retry.retry_count = next_retry;
        // refreshed so the retry survives the age check
        retry.timestamp = shared.clock.wall();
        write_json_atomic(&shared.layout.request_path(&request.request_id), &retry.to_value())?;
        remove_quiet(processing);
        info!(
            request_id = %request.request_id,
            retry = next_retry,
            backoff_ms = backoff.as_millis() as u64,
            "re-emitted for retry"
        );
        reqlog::append(
            &shared.layout,
            &request.request_id,
            shared.clock.wall(),
            &format!("retry {next_retry} re-emitted"),
        );
        Ok(())
    } else {
        // attempt N carries retry_count N-1; exhaustion lands exactly on
        // max_retries
        debug_assert!(request.max_retries == 0 || next_retry >= request.max_retries);
        fail_terminal(shared, request, state, &reason, processing)
    }
}

async fn finish_shutdown<C: Clock>(
    shared: &Arc<Shared<C>>,
    request: &Request,
    mut state: ProcessingState,
    processing: &Path,
) -> Result<(), EngineError> {
    let now = shared.clock.wall();
    let data = json!({"message": "shutting down"});
    state.attempts.push(Attempt {
        attempt: request.retry_count + 1,
        success: true,
        data: Some(data.clone()),
        error: None,
        timestamp: now,
    });
    let response = Response {
        request_id: request.request_id.clone(),
        final_status: FinalStatus::Success,
        attempts: state.attempts.clone(),
        request_timestamp: Some(request.timestamp),
        model_used: None,
        mode_used: None,
        response_length: payload_len(Some(&data)),
        execution_time_s: state.elapsed_s(now),
        error: None,
    };
    shared.writer.write(&response)?;
    state.transition(ProcessingStatus::Completed, now);
    shared.store.insert(state)?;
    remove_quiet(processing);
    info!(request_id = %request.request_id, "shutdown requested via command");
    let _ = shared.shutdown_requests.try_send(());
    Ok(())
}

enum DispatchFailure {
    TimedOut,
    Cancelled,
    Raised(String),
}

impl DispatchFailure {
    fn describe(&self, request: &Request) -> String {
        match self {
            DispatchFailure::TimedOut => {
                format!("dispatch timed out after {}ms", request.timeout_ms)
            }
            DispatchFailure::Cancelled => "dispatch cancelled".to_string(),
            DispatchFailure::Raised(e) => e.clone(),
        }
    }
}

/// Run one dispatch with the request's deadline. On deadline the token is
/// tripped; a dispatcher that ignores it past the grace keeps running
/// detached and its eventual result is discarded.
async fn dispatch_with_deadline<C: Clock>(
    shared: &Arc<Shared<C>>,
    request: &Request,
) -> Result<DispatcherResult, DispatchFailure> {
    // Commands that carry dispatcher configuration apply it first;
    // misapplication is a warning, not a failure.
    if let Command::SubmitPrompt { mode: Some(mode), .. } = &request.command {
        let token = shared.cancel.child_token();
        match shared.dispatcher.dispatch(Command::SetMode { mode: *mode }, token).await {
            Ok(result) if result.success => {}
            Ok(result) => warn!(
                request_id = %request.request_id,
                "mode preamble rejected: {}",
                result.error.as_deref().unwrap_or("no reason given")
            ),
            Err(e) => warn!(request_id = %request.request_id, "mode preamble failed: {e}"),
        }
    }

    let token = shared.cancel.child_token();
    let dispatcher = Arc::clone(&shared.dispatcher);
    let command = request.command.clone();
    let task_token = token.clone();
    let mut task = tokio::spawn(async move { dispatcher.dispatch(command, task_token).await });

    tokio::select! {
        joined = &mut task => settle(joined),
        _ = tokio::time::sleep(request.timeout()) => {
            token.cancel();
            tokio::select! {
                joined = &mut task => match settle(joined) {
                    // a cooperative return after our own deadline trip is a
                    // timeout, not a cancellation
                    Err(DispatchFailure::Cancelled) if !shared.cancel.is_cancelled() => {
                        Err(DispatchFailure::TimedOut)
                    }
                    other => other,
                },
                _ = tokio::time::sleep(shared.cfg.dispatch_grace) => {
                    warn!(
                        request_id = %request.request_id,
                        "dispatcher ignored its deadline, discarding the attempt"
                    );
                    Err(DispatchFailure::TimedOut)
                }
            }
        }
    }
}

fn settle(
    joined: Result<Result<DispatcherResult, DispatcherError>, JoinError>,
) -> Result<DispatcherResult, DispatchFailure> {
    match joined {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(DispatcherError::Cancelled)) => Err(DispatchFailure::Cancelled),
        Ok(Err(DispatcherError::Other(e))) => Err(DispatchFailure::Raised(e)),
        Err(join) => Err(DispatchFailure::Raised(format!("dispatcher panicked: {join}"))),
    }
}

/// Success payload size: character count for plain text, serialized length
/// otherwise.
fn payload_len(data: Option<&Value>) -> u64 {
    match data {
        None => 0,
        Some(Value::String(s)) => s.chars().count() as u64,
        Some(v) => v.to_string().len() as u64,
    }
}

/// Remove a broker-owned file, tolerating a concurrent disappearance.
fn remove_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "failed to remove file: {e}");
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
