// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path specs through the real watcher.

use crate::prelude::*;

#[tokio::test]
#[serial_test::serial]
async fn ping_round_trip() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    bench.write_request("r1", &ping_doc("r1"));

    let response = bench.wait_response("r1").await;
    assert_eq!(response.final_status, FinalStatus::Success);
    assert_eq!(response.attempts.len(), 1);
    assert_eq!(response.attempts[0].attempt, 1);
    assert!(response.attempts[0].success);
    assert_eq!(response.attempts[0].data, Some(json!({"message": "pong"})));

    bench.wait_gone(bench.layout.request_path("r1")).await;
    assert!(!bench.layout.processing_path("r1").exists());
    assert!(!bench.layout.failed_path("r1").exists());

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn prompt_with_mode_reports_the_mode_used() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    bench.write_request(
        "p1",
        &json!({
            "request_id": "p1",
            "command": "submitPrompt",
            "params": {"prompt": "evaluate this", "mode": "chat"},
            "timestamp": Utc::now(),
        }),
    );

    let response = bench.wait_response("p1").await;
    assert_eq!(response.final_status, FinalStatus::Success);
    assert_eq!(response.mode_used.as_deref(), Some("chat"));
    assert_eq!(response.model_used.as_deref(), Some("fake-model"));
    assert!(response.response_length > 0);
    assert!(response.execution_time_s >= 0.0);

    // the dispatcher saw setMode before the prompt
    let calls = dispatcher.calls();
    assert!(matches!(calls[0], proctor_core::Command::SetMode { .. }));
    assert!(matches!(calls[1], proctor_core::Command::SubmitPrompt { .. }));

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn responses_are_complete_json_documents() {
    // atomic visibility: a reader polling aggressively never sees a torn
    // document (read_json_opt would keep returning None until the rename)
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    let reader = {
        let path = bench.layout.response_path("r2");
        tokio::spawn(async move {
            loop {
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        // any observable content must parse
                        let parsed: Result<Response, _> = serde_json::from_slice(&bytes);
                        return parsed.is_ok();
                    }
                    Err(_) => tokio::time::sleep(Duration::from_micros(200)).await,
                }
            }
        })
    };

    bench.write_request("r2", &ping_doc("r2"));
    assert!(reader.await.unwrap());

    broker.shutdown().await;
}
