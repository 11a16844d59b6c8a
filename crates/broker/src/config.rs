// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker configuration: defaults, the TOML config file, env overrides.
//!
//! Keys are read once at startup; only the maintenance interval may be
//! re-read while running (see `env::maintenance_interval`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::env;

/// Default directory interface root, a documented client convention.
pub const DEFAULT_BASE_DIR: &str = "/tmp/copilot-evaluation";

/// Clamp bounds for `pollingInterval` (poll-fallback watcher only)
pub const POLLING_INTERVAL_BOUNDS: (Duration, Duration) =
    (Duration::from_millis(100), Duration::from_millis(10_000));

/// Clamp bounds for `maintenanceInterval`
pub const MAINTENANCE_INTERVAL_BOUNDS: (Duration, Duration) =
    (Duration::from_millis(5_000), Duration::from_millis(300_000));

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Log verbosity for the system log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for the tracing env filter
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// On-disk shape of the optional TOML config file (camelCase keys match the
/// documented client convention).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    base_directory: Option<PathBuf>,
    auto_start: Option<bool>,
    polling_interval: Option<u64>,
    maintenance_interval: Option<u64>,
    log_level: Option<LogLevel>,
    max_concurrent: Option<usize>,
}

/// Resolved broker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the directory interface; single source of truth for paths
    pub base_dir: PathBuf,
    /// When false, `proctord` exits immediately unless forced
    pub auto_start: bool,
    /// Poll cadence for the fallback watcher
    pub polling_interval: Duration,
    /// Maintenance loop cadence
    pub maintenance_interval: Duration,
    /// System log verbosity
    pub log_level: LogLevel,
    /// Lifecycle engine concurrency cap
    pub max_concurrent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            auto_start: true,
            polling_interval: Duration::from_millis(1_000),
            maintenance_interval: Duration::from_millis(30_000),
            log_level: LogLevel::Info,
            max_concurrent: 4,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the config file (if any), then env
    /// overrides. Intervals are clamped to their documented bounds.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let path = file.map(Path::to_path_buf).or_else(env::config_path);
        if let Some(path) = path {
            config.apply_file(&path)?;
        }
        config.apply_env();
        config.clamp();
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let file: ConfigFile = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        if let Some(base) = file.base_directory {
            self.base_dir = base;
        }
        if let Some(auto) = file.auto_start {
            self.auto_start = auto;
        }
        if let Some(ms) = file.polling_interval {
            self.polling_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.maintenance_interval {
            self.maintenance_interval = Duration::from_millis(ms);
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        if let Some(n) = file.max_concurrent {
            self.max_concurrent = n;
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(base) = env::base_dir() {
            self.base_dir = base;
        }
        if let Some(interval) = env::maintenance_interval() {
            self.maintenance_interval = interval;
        }
        if let Some(n) = env::max_concurrent() {
            self.max_concurrent = n;
        }
    }

    fn clamp(&mut self) {
        self.polling_interval = clamp_duration(self.polling_interval, POLLING_INTERVAL_BOUNDS);
        self.maintenance_interval =
            clamp_duration(self.maintenance_interval, MAINTENANCE_INTERVAL_BOUNDS);
        self.max_concurrent = self.max_concurrent.max(1);
    }
}

/// Clamp a duration into `[lo, hi]`.
pub fn clamp_duration(value: Duration, (lo, hi): (Duration, Duration)) -> Duration {
    value.clamp(lo, hi)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
