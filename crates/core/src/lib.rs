// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! proctor-core: data model and shared primitives for the proctor broker
//!
//! Everything that crosses the directory interface lives here: the request
//! and response documents, the broker's durable processing state, the clock
//! abstraction, atomic file helpers, and the workspace identity used to
//! scope the singleton lock.

pub mod clock;
pub mod fsio;
pub mod request;
pub mod response;
pub mod state;
pub mod workspace;

pub use clock::{Clock, FakeClock, SystemClock};
pub use fsio::{read_json_opt, write_atomic, write_json_atomic, WriteError};
pub use request::{
    id_from_path, response_id, Command, Mode, Request, RequestError, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT_MS,
};
pub use response::{Attempt, FailureRecord, FinalStatus, Response};
pub use state::{ProcessingState, ProcessingStatus};
pub use workspace::WorkspaceId;
