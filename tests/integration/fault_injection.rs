//! Fault injection tests.
//!
//! Each test wraps the transaction layer so that one operation always
//! fails, and checks that the failure surfaces as an `Exception` event
//! rather than being lost.

use std::sync::Arc;

use dagflow::core::TaskState;
use dagflow::transactions::FaultPoint;
use dagflow::{Coordinator, CoordinatorConfig, CoordinatorEvent, Error};

use crate::fixtures::{chain, config, fail_on, next_event, succeed, Harness};

fn without_backlog(identifier: &str) -> CoordinatorConfig {
    CoordinatorConfig {
        clear_backlog_on_start: false,
        ..config(identifier)
    }
}

fn expect_fault(event: CoordinatorEvent, point: FaultPoint) {
    match event {
        CoordinatorEvent::Exception(Error::InjectedFault(p)) => assert_eq!(p, point),
        other => panic!("expected injected {:?}, got {:?}", point, other),
    }
}

/// Test: Pop failure
/// Given popping tasks always fails
/// When a workflow is submitted
/// Then an exception is raised and the root stays queued
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pop_task_fault_raises_exception() {
    let harness = Harness::faulty(FaultPoint::PopTask);
    let coordinator = harness.start(&without_backlog("node-a"), succeed()).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&chain(&["a"])).await.unwrap();
    expect_fault(next_event(&events), FaultPoint::PopTask);

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("a").unwrap().state, TaskState::Submitted);

    coordinator.shutdown().await;
}

/// Test: Completion failure
/// Given recording completions always fails
/// When a task handler reports success
/// Then an exception is raised and the task is still running
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complete_task_fault_raises_exception() {
    let harness = Harness::faulty(FaultPoint::CompleteTask);
    let coordinator = harness.coordinator("node-a", succeed()).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&chain(&["a", "b"])).await.unwrap();
    expect_fault(next_event(&events), FaultPoint::CompleteTask);

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("a").unwrap().state, TaskState::Running);
    assert_eq!(details.task("b").unwrap().state, TaskState::Blocked);
    assert_eq!(coordinator.owned_tasks().await.unwrap().len(), 1);

    coordinator.shutdown().await;
}

/// Test: Failure recording failure
/// Given recording failures always fails
/// When a task handler reports failure
/// Then an exception is raised instead of a failed-workflow event
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fail_task_fault_raises_exception() {
    let harness = Harness::faulty(FaultPoint::FailTask);
    let coordinator = harness.coordinator("node-a", fail_on("a")).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&chain(&["a"])).await.unwrap();
    expect_fault(next_event(&events), FaultPoint::FailTask);

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert!(details.failed.is_none());

    coordinator.shutdown().await;
}

/// Test: Finished-workflow pop failure
/// Given popping complete workflows always fails
/// When a workflow finishes
/// Then an exception is raised although the workflow is recorded complete
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pop_complete_workflow_fault_raises_exception() {
    let harness = Harness::faulty(FaultPoint::PopCompleteWorkflow);
    let coordinator = harness.start(&without_backlog("node-a"), succeed()).await;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&chain(&["a"])).await.unwrap();
    expect_fault(next_event(&events), FaultPoint::PopCompleteWorkflow);

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert!(details.complete.is_some());

    coordinator.shutdown().await;
}

/// Test: Start-up drain failure
/// Given popping failed workflows always fails
/// When a coordinator starts with backlog draining enabled
/// Then start returns the injected error
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backlog_fault_fails_start() {
    let harness = Harness::faulty(FaultPoint::PopFailedWorkflow);
    let started = Coordinator::start(
        &config("node-a"),
        Arc::clone(&harness.transactions),
        succeed(),
    )
    .await;
    assert!(matches!(
        started,
        Err(Error::InjectedFault(FaultPoint::PopFailedWorkflow))
    ));
}
