// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery specs: claims left in `processing/` by a dead broker.

use crate::prelude::*;

#[tokio::test]
#[serial_test::serial]
async fn stale_claim_is_failed_on_startup() {
    let bench = Bench::new();
    bench.write_claim("r5", &ping_doc("r5"));
    bench.write_state(&[processing_state(
        "r5",
        ProcessingStatus::Processing,
        ChronoDuration::minutes(10),
    )]);

    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    let record: FailureRecord =
        read_json_opt(&bench.layout.failed_path("r5")).expect("failure mirror");
    assert_eq!(record.failure_reason, "processing timeout during recovery");
    assert!(!bench.layout.processing_path("r5").exists());
    assert_eq!(dispatcher.call_count(), 0);

    let response = bench.wait_response("r5").await;
    assert_eq!(response.final_status, FinalStatus::Failed);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn fresh_claim_resumes_dispatch() {
    let bench = Bench::new();
    bench.write_claim("r6", &ping_doc("r6"));
    bench.write_state(&[processing_state(
        "r6",
        ProcessingStatus::Processing,
        ChronoDuration::minutes(2),
    )]);

    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    let response = bench.wait_response("r6").await;
    assert_eq!(response.final_status, FinalStatus::Success);
    assert!(!bench.layout.processing_path("r6").exists());
    assert_eq!(dispatcher.call_count(), 1);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn requests_written_while_down_are_processed_on_startup() {
    let bench = Bench::new();
    bench.write_request("backlog-1", &ping_doc("backlog-1"));
    bench.write_request("backlog-2", &ping_doc("backlog-2"));

    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    assert_eq!(bench.wait_response("backlog-1").await.final_status, FinalStatus::Success);
    assert_eq!(bench.wait_response("backlog-2").await.final_status, FinalStatus::Success);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn corrupt_state_store_recovers_from_the_processing_directory() {
    let bench = Bench::new();
    std::fs::write(bench.layout.state_file(), b"{torn state").unwrap();
    bench.write_claim("r7", &ping_doc("r7"));

    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    // no durable state survived, so the claim resumes as a fresh dispatch
    let response = bench.wait_response("r7").await;
    assert_eq!(response.final_status, FinalStatus::Success);

    broker.shutdown().await;
}
