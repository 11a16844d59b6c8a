// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace identity for lock scoping.

use std::fmt::Write as _;
use std::path::Path;

use md5::{Digest, Md5};

/// Stable identity of a workspace root: the MD5 hex digest of its absolute
/// path. Scopes the singleton lock so two windows on the same workspace
/// contend while different workspaces never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn from_root(root: &Path) -> Self {
        let abs = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir().map(|cwd| cwd.join(root)).unwrap_or_else(|_| root.to_path_buf())
        };
        let digest = Md5::digest(abs.to_string_lossy().as_bytes());
        let mut hex = String::with_capacity(32);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lock file name under `state/`: `ws.<workspace_id>.lock`
    pub fn lock_file_name(&self) -> String {
        format!("ws.{}.lock", self.0)
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
