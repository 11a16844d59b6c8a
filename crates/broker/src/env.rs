// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the broker crate.

use std::path::PathBuf;
use std::time::Duration;

/// Broker version (from Cargo.toml plus the build git hash)
pub const BROKER_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

/// Optional path to the TOML config file
pub fn config_path() -> Option<PathBuf> {
    std::env::var("PROCTOR_CONFIG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Base directory override
pub fn base_dir() -> Option<PathBuf> {
    std::env::var("PROCTOR_BASE_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Log filter override (takes precedence over the `logLevel` config key)
pub fn log_filter() -> Option<String> {
    std::env::var("PROCTOR_LOG").ok().filter(|s| !s.is_empty())
}

/// Maintenance interval override, re-read each tick so operators can adjust
/// a running broker.
pub fn maintenance_interval() -> Option<Duration> {
    std::env::var("PROCTOR_MAINTENANCE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Concurrency cap override
pub fn max_concurrent() -> Option<usize> {
    std::env::var("PROCTOR_MAX_CONCURRENT").ok().and_then(|s| s.parse::<usize>().ok())
}
