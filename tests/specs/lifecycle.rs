// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker lifecycle specs: the shutdown command and durable state across
//! restarts.

use crate::prelude::*;

#[tokio::test]
#[serial_test::serial]
async fn shutdown_command_answers_and_stops_the_broker() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    let mut broker = bench.start(&dispatcher).await;

    bench.write_request(
        "halt",
        &json!({
            "request_id": "halt",
            "command": "shutdown",
            "params": {},
            "timestamp": Utc::now(),
        }),
    );

    tokio::time::timeout(Duration::from_secs(10), broker.wait_for_shutdown_command())
        .await
        .expect("shutdown command did not arrive");
    broker.shutdown().await;

    let response = read_json_opt::<Response>(&bench.layout.response_path("halt")).unwrap();
    assert_eq!(response.final_status, FinalStatus::Success);
    assert_eq!(dispatcher.call_count(), 0);

    // the lock is released on the graceful path
    let ws = WorkspaceId::from_root(bench.layout.base());
    assert!(!bench.layout.lock_file(&ws).exists());
}

#[tokio::test]
#[serial_test::serial]
async fn completed_state_survives_a_restart_and_suppresses_replays() {
    let bench = Bench::new();
    let doc = ping_doc("sticky");

    let first = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&first).await;
    bench.write_request("sticky", &doc);
    bench.wait_response("sticky").await;
    broker.shutdown().await;
    assert_eq!(first.call_count(), 1);

    // a second incarnation sees the persisted completed state and drops the
    // replayed duplicate without dispatching
    let second = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&second).await;
    bench.write_request("sticky", &doc);
    bench.wait_gone(bench.layout.request_path("sticky")).await;
    assert_eq!(second.call_count(), 0);

    broker.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn many_concurrent_ids_each_get_exactly_one_response() {
    let bench = Bench::new();
    let dispatcher = Arc::new(FakeDispatcher::new());
    dispatcher.set_latency(Duration::from_millis(20));
    let broker = bench.start(&dispatcher).await;

    let ids: Vec<String> = (0..12).map(|i| format!("bulk-{i}")).collect();
    for id in &ids {
        bench.write_request(id, &ping_doc(id));
    }
    for id in &ids {
        let response = bench.wait_response(id).await;
        assert_eq!(response.final_status, FinalStatus::Success);
        assert_eq!(response.attempts.len(), 1);
    }
    assert_eq!(dispatcher.call_count(), ids.len());

    broker.shutdown().await;
}
