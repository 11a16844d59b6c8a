// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step A checks: everything that rejects a request before it is claimed.

use chrono::{DateTime, Utc};
use proctor_core::Request;

use super::EngineConfig;

/// Validate a parsed request against its filename stem and the clock.
/// The returned message becomes the terminal `error` response.
pub(crate) fn check(
    request: &Request,
    stem: &str,
    now: DateTime<Utc>,
    cfg: &EngineConfig,
) -> Result<(), String> {
    if request.request_id != stem {
        return Err(format!(
            "request_id {:?} does not match filename stem {:?}",
            request.request_id, stem
        ));
    }
    if request.retry_count > request.max_retries {
        return Err(format!(
            "retry_count {} exceeds max_retries {}",
            request.retry_count, request.max_retries
        ));
    }
    if request.timestamp > now + cfg.timestamp_skew {
        return Err(format!(
            "timestamp {} is future-dated beyond the allowed skew",
            request.timestamp.to_rfc3339()
        ));
    }
    if now - request.timestamp > cfg.max_request_age {
        return Err(format!(
            "timestamp {} is older than the maximum request age",
            request.timestamp.to_rfc3339()
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
