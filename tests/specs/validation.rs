// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation and duplicate-suppression specs.

use crate::prelude::*;

#[tokio::test]
#[serial_test::serial]
async fn stale_request_gets_an_error_response_without_dispatch() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    bench.write_request(
        "r4",
        &json!({
            "request_id": "r4",
            "command": "ping",
            "params": {},
            "timestamp": Utc::now() - ChronoDuration::hours(48),
        }),
    );

    let response = bench.wait_response("r4").await;
    assert_eq!(response.final_status, FinalStatus::Error);
    assert!(response.attempts.is_empty());
    assert_eq!(dispatcher.call_count(), 0);
    bench.wait_gone(bench.layout.request_path("r4")).await;
    assert!(!bench.layout.failed_path("r4").exists());

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn unknown_command_is_a_validation_error() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    bench.write_request(
        "r5",
        &json!({
            "request_id": "r5",
            "command": "reformatDisk",
            "params": {},
            "timestamp": Utc::now(),
        }),
    );

    let response = bench.wait_response("r5").await;
    assert_eq!(response.final_status, FinalStatus::Error);
    assert!(response.error.as_deref().unwrap_or("").contains("unknown command"));
    assert_eq!(dispatcher.call_count(), 0);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn dropping_the_same_request_twice_dispatches_once() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.set_latency(Duration::from_millis(200));
    let broker = bench.start(&dispatcher).await;

    let doc = ping_doc("dup");
    bench.write_request("dup", &doc);
    tokio::time::sleep(Duration::from_millis(50)).await;
    bench.write_request("dup", &doc);

    let response = bench.wait_response("dup").await;
    assert_eq!(response.final_status, FinalStatus::Success);

    // the second drop either raced into the same claim or was dropped as a
    // duplicate; exactly one dispatch happened either way
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(dispatcher.call_count(), 1);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn replay_after_completion_is_deleted_not_redispatched() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    let doc = ping_doc("replay");
    bench.write_request("replay", &doc);
    bench.wait_response("replay").await;
    assert_eq!(dispatcher.call_count(), 1);

    bench.write_request("replay", &doc);
    bench.wait_gone(bench.layout.request_path("replay")).await;
    assert_eq!(dispatcher.call_count(), 1);

    broker.shutdown().await;
}
