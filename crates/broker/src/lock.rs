// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-scoped singleton lock with stale-owner takeover.
//!
//! The lock file under `state/` holds the owning pid. Liveness is probed
//! with signal 0; a dead owner's file is removed and acquisition retried
//! once. Heartbeat rewrites keep the record current and let a restarted
//! incarnation with the same pid reclaim its own lock.

use std::io;
use std::path::PathBuf;

use proctor_core::{write_atomic, WorkspaceId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::layout::Layout;

/// Heartbeat cadence for lock refresh
pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);

/// Lock errors. Any I/O failure during acquisition is fatal; the broker
/// must not activate on a workspace it cannot lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("IO error on lock file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Outcome of an acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    Denied { owner_pid: u32 },
}

/// Owns the lock file for one workspace.
#[derive(Debug)]
pub struct LockManager {
    path: PathBuf,
    pid: u32,
}

impl LockManager {
    pub fn new(layout: &Layout, workspace: &WorkspaceId) -> Self {
        Self { path: layout.lock_file(workspace), pid: std::process::id() }
    }

    #[cfg(test)]
    fn with_pid(layout: &Layout, workspace: &WorkspaceId, pid: u32) -> Self {
        Self { path: layout.lock_file(workspace), pid }
    }

    /// Attempt to acquire the workspace lock.
    pub fn acquire(&self) -> Result<Acquire, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
        }

        // One takeover retry: first pass may find a stale owner.
        for _ in 0..2 {
            match self.read_owner()? {
                None => {
                    self.write_pid()?;
                    // Confirm against a concurrent claimant racing the write.
                    if self.read_owner()? == Some(self.pid) {
                        return Ok(Acquire::Acquired);
                    }
                }
                Some(pid) if pid == self.pid => return Ok(Acquire::Acquired),
                Some(pid) if pid_alive(pid) => return Ok(Acquire::Denied { owner_pid: pid }),
                Some(pid) => {
                    warn!(stale_pid = pid, path = %self.path.display(), "taking over stale workspace lock");
                    match std::fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(source) => return Err(self.io_err(source)),
                    }
                }
            }
        }

        match self.read_owner()? {
            Some(pid) if pid != self.pid => Ok(Acquire::Denied { owner_pid: pid }),
            _ => Ok(Acquire::Acquired),
        }
    }

    /// Refresh the lock record with this process's pid. Errors are reported
    /// to the caller but are not fatal to the broker.
    pub fn heartbeat(&self) -> Result<(), LockError> {
        self.write_pid()
    }

    /// Release the lock. Idempotent; only removes the file while it still
    /// names this process.
    pub fn release(&self) {
        match self.read_owner() {
            Ok(Some(pid)) if pid == self.pid => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(path = %self.path.display(), "failed to release workspace lock: {e}");
                    }
                }
            }
            Ok(_) => debug!(path = %self.path.display(), "lock not held by this process, leaving in place"),
            Err(e) => warn!("failed to read lock during release: {e}"),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn write_pid(&self) -> Result<(), LockError> {
        write_atomic(&self.path, format!("{}\n", self.pid).as_bytes())
            .map_err(|source| self.io_err(source))
    }

    /// `Ok(None)` means absent. Present-but-unparseable records are treated
    /// as stale owners (pid 0 is never alive) so takeover proceeds.
    fn read_owner(&self) -> Result<Option<u32>, LockError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text.trim().parse::<u32>().unwrap_or(0))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_err(source)),
        }
    }

    fn io_err(&self, source: io::Error) -> LockError {
        LockError::Io { path: self.path.clone(), source }
    }
}

/// Signal-0 liveness probe. EPERM means the pid exists but belongs to
/// another user, which still counts as alive.
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
