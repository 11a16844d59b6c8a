// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Singleton-lock specs: denial while the owner lives, takeover when it is
//! dead.

use crate::prelude::*;

fn lock_path(bench: &Bench) -> PathBuf {
    let ws = WorkspaceId::from_root(bench.layout.base());
    bench.layout.lock_file(&ws)
}

#[tokio::test]
#[serial_test::serial]
async fn second_broker_is_denied_while_the_owner_lives() {
    let bench = Bench::new();
    // pid 1 stands in for a live broker in another process
    std::fs::write(lock_path(&bench), "1\n").unwrap();

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(FakeDispatcher::new());
    let err = Broker::start(bench.config(), dispatcher).await.unwrap_err();
    assert!(matches!(err, BrokerError::LockDenied { owner_pid: 1 }));

    // the owner's record is untouched
    assert_eq!(std::fs::read_to_string(lock_path(&bench)).unwrap().trim(), "1");
}

#[tokio::test]
#[serial_test::serial]
async fn dead_owner_is_taken_over() {
    let bench = Bench::new();
    // far above any default pid_max
    std::fs::write(lock_path(&bench), "4000000\n").unwrap();

    let dispatcher = Arc::new(FakeDispatcher::new());
    let broker = bench.start(&dispatcher).await;

    let recorded = std::fs::read_to_string(lock_path(&bench)).unwrap();
    assert_eq!(recorded.trim(), std::process::id().to_string());

    broker.shutdown().await;
    assert!(!lock_path(&bench).exists());
}
