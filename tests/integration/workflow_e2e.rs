//! End-to-end workflow integration tests.
//!
//! These tests verify that workflows submitted through a coordinator run
//! to completion or failure, and that each finished workflow is reported
//! exactly once.

use dagflow::core::TaskState;
use dagflow::CoordinatorEvent;

use crate::fixtures::{
    assert_quiet, fail_on, fan_out, next_event, prioritised, submit_only, succeed, wait_until,
    Harness, Recorder,
};

/// Test: E2E Happy Path
/// Given A -> B -> {C, D}
/// When every task succeeds
/// Then one WorkflowComplete event carries four complete tasks
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_completes() {
    let harness = Harness::new();
    let coordinator = harness.coordinator("node-a", succeed()).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&fan_out()).await.unwrap();

    match next_event(&events) {
        CoordinatorEvent::WorkflowComplete { id: done, details } => {
            assert_eq!(done, id);
            assert_eq!(details.total, 4);
            assert_eq!(details.remaining, 0);
            assert!(details.complete.is_some());
            assert!(details.failed.is_none());
            assert_eq!(details.count_in(TaskState::Complete), 4);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_quiet(&events);

    coordinator.shutdown().await;
}

/// Test: Failure halts descendants
/// Given A -> B -> {C, D}
/// When B fails
/// Then exactly one WorkflowFailed event is raised and C, D are never submitted
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_halts_fan_out() {
    let harness = Harness::new();
    let coordinator = harness.coordinator("node-a", fail_on("B")).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&fan_out()).await.unwrap();

    let details = match next_event(&events) {
        CoordinatorEvent::WorkflowFailed { id: failed, details } => {
            assert_eq!(failed, id);
            details
        }
        other => panic!("expected failure, got {:?}", other),
    };
    assert!(details.failed.is_some());
    assert_eq!(details.task("A").unwrap().state, TaskState::Complete);
    assert_eq!(details.task("B").unwrap().state, TaskState::Failed);
    for name in ["C", "D"] {
        let task = details.task(name).unwrap();
        assert_eq!(task.state, TaskState::Blocked);
        assert!(task.submitted.is_none(), "{} was submitted", name);
    }
    assert_quiet(&events);

    coordinator.shutdown().await;
}

/// Test: Conservation after a mixed outcome
/// Given four independent roots, one of which fails
/// When every task has reported
/// Then complete + failed equals the task count and one failure event is raised
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conservation_with_independent_failure() {
    let harness = Harness::new();
    let coordinator = harness.coordinator("node-a", fail_on("2")).await;
    let events = coordinator.events();

    let id = coordinator
        .submit_workflow(&prioritised(&[1, 2, 3, 4]))
        .await
        .unwrap();

    assert!(matches!(
        next_event(&events),
        CoordinatorEvent::WorkflowFailed { .. }
    ));

    let transactions = coordinator.transactions();
    assert!(
        wait_until(|| {
            transactions
                .fetch_workflow_information(id)
                .map(|d| d.remaining == 0)
                .unwrap_or(false)
        })
        .await
    );

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.count_in(TaskState::Complete), 3);
    assert_eq!(details.count_in(TaskState::Failed), 1);
    assert_eq!(
        details.count_in(TaskState::Complete) + details.count_in(TaskState::Failed),
        details.total as usize
    );
    assert_quiet(&events);

    coordinator.shutdown().await;
}

/// Test: Submit-only instances never run tasks
/// Given an instance with process_tasks off
/// When it submits a workflow
/// Then the roots stay queued until a processing instance starts and drains them
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_only_defers_to_processors() {
    let harness = Harness::new();
    let submitter = harness
        .start(&submit_only("submitter"), succeed())
        .await;

    let id = submitter.submit_workflow(&fan_out()).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let details = submitter.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("A").unwrap().state, TaskState::Submitted);
    assert!(submitter.owned_tasks().await.unwrap().is_empty());

    let recorder = Recorder::default();
    let processor = harness.coordinator("processor", recorder.handler()).await;
    let events = processor.events();
    let submitter_events = submitter.events();

    // Either instance may pop the finished workflow.
    let finished = wait_until(|| {
        matches!(
            events.try_recv().or_else(|_| submitter_events.try_recv()),
            Ok(CoordinatorEvent::WorkflowComplete { .. })
        )
    })
    .await;
    assert!(finished);
    assert_eq!(recorder.seen().len(), 4);
    assert_eq!(recorder.seen()[0], "A");
    assert_eq!(recorder.seen()[1], "B");

    processor.shutdown().await;
    submitter.shutdown().await;
}
