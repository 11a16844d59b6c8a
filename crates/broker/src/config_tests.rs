// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;
use yare::parameterized;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("proctor.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.base_dir, PathBuf::from("/tmp/copilot-evaluation"));
    assert!(config.auto_start);
    assert_eq!(config.polling_interval, Duration::from_millis(1_000));
    assert_eq!(config.maintenance_interval, Duration::from_millis(30_000));
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.max_concurrent, 4);
}

#[test]
#[serial_test::serial]
fn file_keys_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
baseDirectory = "/tmp/proctor-alt"
autoStart = false
pollingInterval = 500
maintenanceInterval = 60000
logLevel = "debug"
maxConcurrent = 8
"#,
    );
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.base_dir, PathBuf::from("/tmp/proctor-alt"));
    assert!(!config.auto_start);
    assert_eq!(config.polling_interval, Duration::from_millis(500));
    assert_eq!(config.maintenance_interval, Duration::from_millis(60_000));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.max_concurrent, 8);
}

#[test]
#[serial_test::serial]
fn intervals_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
pollingInterval = 1
maintenanceInterval = 999999999
"#,
    );
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.polling_interval, Duration::from_millis(100));
    assert_eq!(config.maintenance_interval, Duration::from_millis(300_000));
}

#[test]
fn unreadable_file_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/proctor.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
#[serial_test::serial]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "baseDirectory = [not toml");
    assert!(matches!(Config::load(Some(&path)).unwrap_err(), ConfigError::Parse { .. }));
}

#[parameterized(
    debug = { LogLevel::Debug, "debug" },
    info = { LogLevel::Info, "info" },
    warn = { LogLevel::Warn, "warn" },
    error = { LogLevel::Error, "error" },
)]
fn log_level_filters(level: LogLevel, expected: &str) {
    assert_eq!(level.as_filter(), expected);
}
