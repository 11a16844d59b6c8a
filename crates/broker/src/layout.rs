// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The well-known directory layout under the configured base.
//!
//! The layout is the single source of truth for paths; no other module
//! assembles a path under the base by hand. Directories are created on
//! start and never deleted.

use std::io;
use std::path::{Path, PathBuf};

use proctor_core::{response_id, WorkspaceId};

/// Typed accessors for the seven well-known subdirectories.
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create any missing directory under the base.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.requests(),
            self.responses(),
            self.processing(),
            self.failed(),
            self.logs(),
            self.state_dir(),
            self.config_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn requests(&self) -> PathBuf {
        self.base.join("requests")
    }

    pub fn responses(&self) -> PathBuf {
        self.base.join("responses")
    }

    pub fn processing(&self) -> PathBuf {
        self.base.join("processing")
    }

    pub fn failed(&self) -> PathBuf {
        self.base.join("failed")
    }

    pub fn logs(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base.join("state")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base.join("config")
    }

    pub fn request_path(&self, id: &str) -> PathBuf {
        self.requests().join(format!("{id}.json"))
    }

    pub fn processing_path(&self, id: &str) -> PathBuf {
        self.processing().join(format!("{id}.json"))
    }

    /// Response filename derives from the id with any `req_` prefix stripped.
    pub fn response_path(&self, id: &str) -> PathBuf {
        self.responses().join(format!("{}.json", response_id(id)))
    }

    pub fn failed_path(&self, id: &str) -> PathBuf {
        self.failed().join(format!("{}.json", response_id(id)))
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("processing_state.json")
    }

    pub fn lock_file(&self, workspace: &WorkspaceId) -> PathBuf {
        self.state_dir().join(workspace.lock_file_name())
    }

    /// Advisory snapshot clients may read
    pub fn snapshot_file(&self) -> PathBuf {
        self.config_dir().join("current_state.json")
    }

    pub fn system_log(&self) -> PathBuf {
        self.logs().join("system.log")
    }

    pub fn request_log(&self, id: &str) -> PathBuf {
        self.logs().join(format!("{id}.log"))
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
