//! Pause and release integration tests.
//!
//! These tests verify that pausing takes every queued and running task of
//! a workflow out of circulation, and that releasing restores exactly the
//! state it had.

use dagflow::core::{Responsible, Task, TaskState, Workflow};
use dagflow::dispatch::{PopRequest, QueueKey};
use dagflow::transactions::keys;
use dagflow::Store;

use crate::fixtures::{chain, ts, wait_until, Harness, Holder};

fn queue_and_running(harness: &Harness) -> (Vec<String>, Vec<String>) {
    harness
        .store
        .atomically(|tx| Ok((tx.zrange(&QueueKey::Untyped.key())?, tx.smembers(keys::RUNNING)?)))
        .unwrap()
}

/// Test: Pause/release round trip
/// Given a workflow with one task mid-run and five queued
/// When it is paused and then released
/// Then the queue and the running set match their state before the pause
#[test]
fn test_pause_release_restores_queue_and_running() {
    let harness = Harness::new();
    let mut workflow = Workflow::new("round-trip");
    workflow.add_task(Task::new("R", "R")).unwrap();
    for p in 1..=5 {
        workflow
            .add_task(Task::new(format!("q{}", p), "queued").with_priority(p))
            .unwrap();
    }
    let id = harness
        .transactions
        .submit_workflow(&workflow.submission().unwrap(), &ts())
        .unwrap();
    let me = Responsible::from("node-a");
    let running = harness
        .transactions
        .pop_task(&PopRequest::untyped(), &ts(), &me)
        .unwrap()
        .unwrap();
    assert_eq!(running.payload.as_str(), "R");

    let before = queue_and_running(&harness);
    assert_eq!(before.0.len(), 5);
    assert_eq!(before.1, vec![running.id.to_string()]);

    harness.transactions.pause_workflow(id, &ts()).unwrap();
    let paused = harness.transactions.fetch_workflow_information(id).unwrap();
    assert!(paused.is_paused());
    assert_eq!(paused.count_in(TaskState::Paused), 6);
    assert_eq!(
        paused.task("R").unwrap().previous_state.as_deref(),
        Some(keys::RESTORE_RUNNING)
    );
    assert_eq!(queue_and_running(&harness), (vec![], vec![]));
    assert!(harness
        .transactions
        .pop_task(&PopRequest::untyped(), &ts(), &me)
        .unwrap()
        .is_none());

    harness.transactions.release_workflow(id, &ts()).unwrap();
    assert_eq!(queue_and_running(&harness), before);
    let released = harness.transactions.fetch_workflow_information(id).unwrap();
    assert!(!released.is_paused());
    assert_eq!(released.count_in(TaskState::Running), 1);
    assert_eq!(released.count_in(TaskState::Submitted), 5);
}

/// Test: Round trip with equal priorities
/// Given a child released behind its siblings although declared first,
///       and a sibling mid-run
/// When the workflow is paused and released
/// Then the queue keeps its pop order and the running set is unchanged
#[test]
fn test_pause_release_keeps_fifo_within_priority() {
    let harness = Harness::new();
    let workflow = Workflow::new("fifo")
        .with_task(Task::new("c", "c").with_parents(["r"]))
        .unwrap()
        .with_task(Task::new("r", "r"))
        .unwrap()
        .with_task(Task::new("s", "s"))
        .unwrap()
        .with_task(Task::new("z", "z"))
        .unwrap()
        .with_task(Task::new("w", "w"))
        .unwrap();
    let id = harness
        .transactions
        .submit_workflow(&workflow.submission().unwrap(), &ts())
        .unwrap();
    let me = Responsible::from("node-a");
    let pop = || {
        harness
            .transactions
            .pop_task(&PopRequest::untyped(), &ts(), &me)
            .unwrap()
            .unwrap()
    };
    let r = pop();
    assert_eq!(r.payload.as_str(), "r");
    harness.transactions.complete_task(r.id, &ts(), &me).unwrap();
    let s = pop();
    assert_eq!(s.payload.as_str(), "s");

    let before = queue_and_running(&harness);
    assert_eq!(before.1, vec![s.id.to_string()]);

    harness.transactions.pause_workflow(id, &ts()).unwrap();
    assert_eq!(queue_and_running(&harness), (vec![], vec![]));
    harness.transactions.release_workflow(id, &ts()).unwrap();
    assert_eq!(queue_and_running(&harness), before);

    let rest: Vec<String> = (0..3).map(|_| pop().payload.to_string()).collect();
    assert_eq!(rest, vec!["z", "w", "c"]);
}

/// Test: Pausing twice is harmless
/// Given a paused workflow
/// When it is paused again and released once
/// Then every task is back where it was
#[test]
fn test_pause_is_idempotent() {
    let harness = Harness::new();
    let id = harness
        .transactions
        .submit_workflow(&chain(&["a", "b"]).submission().unwrap(), &ts())
        .unwrap();

    harness.transactions.pause_workflow(id, &ts()).unwrap();
    harness.transactions.pause_workflow(id, &ts()).unwrap();
    harness.transactions.release_workflow(id, &ts()).unwrap();

    let details = harness.transactions.fetch_workflow_information(id).unwrap();
    assert_eq!(details.task("a").unwrap().state, TaskState::Submitted);
    assert_eq!(details.task("b").unwrap().state, TaskState::Blocked);
    assert_eq!(queue_and_running(&harness).0.len(), 1);
}

/// Test: Completion while paused
/// Given a -> b with a running when the workflow is paused
/// When a completes during the pause
/// Then b is parked as paused, and runs only after release
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completion_during_pause_parks_children() {
    let harness = Harness::new();
    let holder = Holder::default();
    let coordinator = harness.coordinator("node-a", holder.handler()).await;

    let id = coordinator.submit_workflow(&chain(&["a", "b"])).await.unwrap();
    assert!(wait_until(|| holder.count() == 1).await);

    coordinator.pause_workflow(id).await.unwrap();
    holder.take("a").on_success();

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("a").unwrap().state, TaskState::Complete);
    assert_eq!(details.task("b").unwrap().state, TaskState::Paused);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(holder.count(), 0);

    coordinator.release_workflow(id).await.unwrap();
    assert!(wait_until(|| holder.count() == 1).await);
    holder.take("b").on_success();

    let details = coordinator.fetch_workflow_information(id).await.unwrap();
    assert!(details.complete.is_some());
    assert!(coordinator.owned_tasks().await.unwrap().is_empty());

    coordinator.shutdown().await;
}
