// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-request text logs under `logs/<id>.log`.

use std::io::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::layout::Layout;

/// Append one line to the request's log. Log failures never fail a request.
pub(crate) fn append(layout: &Layout, id: &str, now: DateTime<Utc>, line: &str) {
    let path = layout.request_log(id);
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| {
            writeln!(file, "[{}] {line}", now.to_rfc3339_opts(SecondsFormat::Millis, true))
        });
    if let Err(e) = result {
        warn!(request_id = %id, "failed to append request log: {e}");
    }
}
