//! Ownership and crash recovery integration tests.
//!
//! A coordinator that stops without reporting leaves its claimed tasks
//! in the running set under its identifier. These tests verify that
//! exactly those tasks are reclaimed when an instance with the same
//! identifier comes back.

use dagflow::core::{Responsible, Task, TaskState, Workflow};
use dagflow::dispatch::PopRequest;
use dagflow::CoordinatorEvent;

use crate::fixtures::{chain, next_event, succeed, ts, wait_until, Harness, Holder};

/// Test: Resubmission returns exactly the crashed instance's tasks
/// Given node-x holding one claimed task and node-y holding another
/// When node-x stops and its tasks are resubmitted
/// Then node-x's task is queued again and node-y's claim is untouched
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resubmit_reclaims_only_owned_tasks() {
    let harness = Harness::new();
    let holder = Holder::default();
    let node_x = harness.coordinator("node-x", holder.handler()).await;

    let id = node_x.submit_workflow(&chain(&["T", "after"])).await.unwrap();
    assert!(wait_until(|| holder.count() == 1).await);
    let owned = node_x.owned_tasks().await.unwrap();
    assert_eq!(owned.len(), 1);
    node_x.shutdown().await;

    // node-y claims a task of its own directly.
    let other = harness
        .transactions
        .submit_workflow(
            &Workflow::new("other")
                .with_task(Task::new("U", "U"))
                .unwrap()
                .submission()
                .unwrap(),
            &ts(),
        )
        .unwrap();
    let node_y = Responsible::from("node-y");
    let claimed = harness
        .transactions
        .pop_task(&PopRequest::untyped(), &ts(), &node_y)
        .unwrap()
        .expect("U should be ready");

    let node_x_id = Responsible::from("node-x");
    let resubmitted = harness
        .transactions
        .resubmit_tasks_for(&node_x_id, &ts())
        .unwrap();
    assert_eq!(resubmitted, owned);

    assert!(harness.transactions.find_tasks_for(&node_x_id).unwrap().is_empty());
    assert_eq!(
        harness.transactions.find_tasks_for(&node_y).unwrap(),
        vec![claimed.id]
    );

    let details = harness.transactions.fetch_workflow_information(id).unwrap();
    let t = details.task("T").unwrap();
    assert_eq!(t.state, TaskState::Submitted);
    assert_eq!(t.last_known_responsible, Some(node_x_id));
    let u = harness.transactions.fetch_workflow_information(other).unwrap();
    assert_eq!(u.task("U").unwrap().state, TaskState::Running);
}

/// Test: Restart under the same identifier
/// Given node-x crashed while holding T
/// When a new coordinator starts as node-x with auto-restart
/// Then T runs again, the workflow completes and node-x owns nothing
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_with_same_identifier_finishes_workflow() {
    let harness = Harness::new();
    let holder = Holder::default();
    let crashed = harness.coordinator("node-x", holder.handler()).await;
    let id = crashed.submit_workflow(&chain(&["T", "U"])).await.unwrap();
    assert!(wait_until(|| holder.count() == 1).await);
    crashed.shutdown().await;

    let restarted = harness.coordinator("node-x", succeed()).await;
    let events = restarted.events();

    match next_event(&events) {
        CoordinatorEvent::WorkflowComplete { id: done, details } => {
            assert_eq!(done, id);
            assert_eq!(details.count_in(TaskState::Complete), 2);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(restarted.owned_tasks().await.unwrap().is_empty());

    restarted.shutdown().await;
}

/// Test: Auto-restart off leaves orphans alone
/// Given node-x crashed while holding T
/// When node-x restarts with auto-restart disabled
/// Then T is still running under node-x
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_auto_restart_disabled_keeps_claims() {
    let harness = Harness::new();
    let holder = Holder::default();
    let crashed = harness.coordinator("node-x", holder.handler()).await;
    let id = crashed.submit_workflow(&chain(&["T"])).await.unwrap();
    assert!(wait_until(|| holder.count() == 1).await);
    crashed.shutdown().await;

    let mut config = crate::fixtures::config("node-x");
    config.behaviours.auto_restart = false;
    let restarted = harness.start(&config, succeed()).await;

    assert_eq!(restarted.owned_tasks().await.unwrap().len(), 1);
    let details = restarted.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("T").unwrap().state, TaskState::Running);

    restarted.shutdown().await;
}
