mod common;

use std::fs;
use std::sync::Arc;

use restock_sync::{CancellationToken, EngineSettings, ReconcileError, RunState};

use common::{harness, harness_with, server_error};

#[tokio::test(flavor = "current_thread")]
async fn second_run_is_rejected_while_first_is_active() {
    let h = harness();
    h.source.set(&[("A", 1)]);
    let gate = h.target.gate();
    let mut states = h.orchestrator.subscribe_state();

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&h.orchestrator);
        async move { orchestrator.run(false).await }
    });
    while *states.borrow_and_update() != RunState::ExecutingBatches {
        states.changed().await.expect("state channel open");
    }

    let err = h.orchestrator.run(false).await.unwrap_err();
    assert!(matches!(err, ReconcileError::ConcurrentRun));
    let err = h.orchestrator.reset().await.unwrap_err();
    assert!(matches!(err, ReconcileError::ConcurrentRun));

    gate.notify_one();
    let summary = first.await.expect("join").expect("first run");
    assert_eq!(summary.successful, 1);
    assert_eq!(h.orchestrator.state(), RunState::Done);

    // The lock is released once the run completes.
    h.orchestrator.run(false).await.expect("third run");
}

#[tokio::test]
async fn preview_does_not_take_the_run_lock() {
    let h = harness();
    h.source.set(&[("A", 1)]);
    let gate = h.target.gate();
    let mut states = h.orchestrator.subscribe_state();

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&h.orchestrator);
        async move { orchestrator.run(false).await }
    });
    while *states.borrow_and_update() != RunState::ExecutingBatches {
        states.changed().await.expect("state channel open");
    }

    let preview = h.orchestrator.preview().await.expect("preview during run");
    assert_eq!(preview.new.len(), 1);

    gate.notify_one();
    run.await.expect("join").expect("run");
}

#[tokio::test]
async fn cancellation_stops_further_batches_and_keeps_completed_work() {
    let h = harness_with(EngineSettings {
        batch_size: 2,
        ..Default::default()
    });
    h.source.set(&[("A", 1), ("B", 2), ("C", 3), ("D", 4), ("E", 5)]);
    let cancel = CancellationToken::new();
    h.target.cancel_after(1, cancel.clone());

    let summary = h
        .orchestrator
        .run_with_cancel(false, &cancel)
        .await
        .expect("cancelled run still finalizes");

    assert!(summary.cancelled);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.skipped, 3);
    assert!(summary.snapshot_updated);
    assert_eq!(h.stored_quantity("A"), Some(1));
    assert_eq!(h.stored_quantity("B"), Some(2));
    assert_eq!(h.stored_quantity("C"), None, "unexecuted batch left untouched");

    let next = h.orchestrator.run(false).await.expect("follow-up run");
    assert_eq!(next.new, 3);
    assert_eq!(next.successful, 3);
}

#[tokio::test]
async fn cancellation_after_last_batch_is_not_reported() {
    let h = harness_with(EngineSettings {
        batch_size: 1,
        ..Default::default()
    });
    h.source.set(&[("A", 1), ("B", 2)]);
    let cancel = CancellationToken::new();
    h.target.cancel_after(2, cancel.clone());

    let summary = h
        .orchestrator
        .run_with_cancel(false, &cancel)
        .await
        .expect("run");

    assert!(cancel.is_cancelled());
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.cancelled, "nothing was left behind");
    assert!(summary.is_clean());
}

#[tokio::test(start_paused = true, flavor = "current_thread")]
async fn cancellation_during_backoff_skips_the_batch() {
    let h = harness();
    h.source.set(&[("A", 1), ("B", 2)]);
    h.target.script(vec![Err(server_error()), Err(server_error())]);
    let cancel = CancellationToken::new();

    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
            cancel.cancel();
        }
    });
    let summary = h
        .orchestrator
        .run_with_cancel(false, &cancel)
        .await
        .expect("run");
    canceller.await.expect("join");

    assert!(summary.cancelled);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.stats.retries, 1);
    assert_eq!(h.stored_quantity("A"), None);
}

#[tokio::test]
async fn unwritable_snapshot_surfaces_finalize_error_with_summary() {
    let h = harness();
    h.source.set(&[("A", 7)]);
    let state_dir = h.dir.path().join("state");
    fs::create_dir_all(state_dir.join("snapshot.json.tmp")).unwrap();

    let err = h.orchestrator.run(false).await.unwrap_err();
    match err {
        ReconcileError::Finalize { summary, .. } => {
            assert_eq!(summary.successful, 1);
            assert!(!summary.snapshot_updated);
        }
        other => panic!("expected Finalize, got {other:?}"),
    }
    assert_eq!(h.orchestrator.state(), RunState::Failed);
    assert_eq!(h.target.submitted().len(), 1, "applied work is not undone");
}

#[tokio::test]
async fn state_channel_reports_full_pipeline() {
    let h = harness();
    h.source.set(&[("A", 1)]);
    let mut states = h.orchestrator.subscribe_state();
    assert_eq!(*states.borrow_and_update(), RunState::Idle);

    h.orchestrator.run(false).await.expect("run");
    assert_eq!(*states.borrow_and_update(), RunState::Done);
    assert!(states.has_changed().is_ok());
}
