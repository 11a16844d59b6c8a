// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry and exhaustion specs: bounded attempts, the failure mirror, and
//! the attempt log accumulated across re-emissions.

use crate::prelude::*;

#[tokio::test]
#[serial_test::serial]
async fn fails_once_then_succeeds() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::with_script([FakeOutcome::Fail(
        "model unavailable".into(),
    )]));
    let broker = bench.start(&dispatcher).await;

    bench.write_request("r2", &doc_with("r2", json!({"max_retries": 3})));

    let response = bench.wait_response("r2").await;
    assert_eq!(response.final_status, FinalStatus::Success);
    assert_eq!(response.attempts.len(), 2);
    assert!(!response.attempts[0].success);
    assert_eq!(response.attempts[0].error.as_deref(), Some("model unavailable"));
    assert!(response.attempts[1].success);
    assert_eq!(response.attempts[1].attempt, 2);
    assert!(!bench.layout.failed_path("r2").exists());

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn exhaustion_mirrors_into_failed() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::with_script([
        FakeOutcome::Fail("broken".into()),
        FakeOutcome::Fail("broken".into()),
    ]));
    let broker = bench.start(&dispatcher).await;

    bench.write_request("r3", &doc_with("r3", json!({"max_retries": 2})));

    let response = bench.wait_response("r3").await;
    assert_eq!(response.final_status, FinalStatus::Failed);
    assert_eq!(response.attempts.len(), 2);
    // bounded attempts: the last entry's outcome matches the final status
    assert!(!response.attempts.last().unwrap().success);
    assert!(response.attempts.len() <= 2 + 1);

    let record: FailureRecord =
        read_json_opt(&bench.layout.failed_path("r3")).expect("failure mirror");
    assert_eq!(record.failure_reason, "broken");
    assert_eq!(record.response.attempts.len(), 2);

    // cleanup law
    bench.wait_gone(bench.layout.request_path("r3")).await;
    assert!(!bench.layout.processing_path("r3").exists());

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn retry_files_use_the_canonical_name_and_payload_counter() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::with_script([FakeOutcome::Raise(
        "connection reset".into(),
    )]));
    let broker = bench.start(&dispatcher).await;

    bench.write_request("r4", &doc_with("r4", json!({"max_retries": 3})));

    // between the failed attempt and the retry pickup the re-emitted file
    // is visible under the canonical name with the bumped counter
    let retry_path = bench.layout.request_path("r4");
    let mut observed_retry = false;
    for _ in 0..1500 {
        if let Some(doc) = read_json_opt::<Value>(&retry_path) {
            if doc["retry_count"] == json!(1) {
                observed_retry = true;
                break;
            }
        }
        if bench.layout.response_path("r4").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(observed_retry, "re-emitted retry file was never observed");

    let response = bench.wait_response("r4").await;
    assert_eq!(response.final_status, FinalStatus::Success);
    assert_eq!(response.attempts.len(), 2);
    assert_eq!(
        response.attempts[0].error.as_deref(),
        Some("connection reset")
    );

    broker.shutdown().await;
}
