//! Dispatch ordering integration tests.
//!
//! Tasks are queued first by a submit-only instance, then drained by a
//! processing instance at start so the order they run in is deterministic.

use dagflow::core::{Task, TaskState, Workflow};
use dagflow::CoordinatorConfig;

use crate::fixtures::{config, prioritised, submit_only, succeed, wait_until, Harness, Recorder};

/// Test: Priority ordering
/// Given roots with priorities 3, 2, 1, 4, 6, 5 queued in that order
/// When a single processor drains the queue
/// Then they run in the order 1, 2, 3, 4, 5, 6
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lowest_priority_value_runs_first() {
    let harness = Harness::new();
    let submitter = harness.start(&submit_only("submitter"), succeed()).await;
    submitter
        .submit_workflow(&prioritised(&[3, 2, 1, 4, 6, 5]))
        .await
        .unwrap();

    let recorder = Recorder::default();
    let processor = harness.coordinator("processor", recorder.handler()).await;

    assert!(wait_until(|| recorder.seen().len() == 6).await);
    assert_eq!(recorder.seen(), vec!["1", "2", "3", "4", "5", "6"]);

    processor.shutdown().await;
    submitter.shutdown().await;
}

/// Test: FIFO among equal priorities
/// Given three roots sharing a priority
/// When a processor drains the queue
/// Then they run in declaration order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_equal_priorities_run_in_submission_order() {
    let harness = Harness::new();
    let submitter = harness.start(&submit_only("submitter"), succeed()).await;
    let workflow = Workflow::new("ties")
        .with_task(Task::new("first", "first").with_priority(2))
        .unwrap()
        .with_task(Task::new("second", "second").with_priority(2))
        .unwrap()
        .with_task(Task::new("third", "third").with_priority(2))
        .unwrap();
    submitter.submit_workflow(&workflow).await.unwrap();

    let recorder = Recorder::default();
    let processor = harness.coordinator("processor", recorder.handler()).await;

    assert!(wait_until(|| recorder.seen().len() == 3).await);
    assert_eq!(recorder.seen(), vec!["first", "second", "third"]);

    processor.shutdown().await;
    submitter.shutdown().await;
}

/// Test: Priority band
/// Given roots with priorities 0, 1 and 5
/// When a processor bounded to priority 1 runs
/// Then the priority 5 task stays queued until an unbounded processor starts
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_priority_band_leaves_lower_priority_queued() {
    let harness = Harness::new();
    let bounded = CoordinatorConfig {
        lowest_priority: Some(1),
        ..config("bounded")
    };
    let recorder = Recorder::default();
    let processor = harness.start(&bounded, recorder.handler()).await;

    let id = processor
        .submit_workflow(&prioritised(&[0, 1, 5]))
        .await
        .unwrap();

    assert!(wait_until(|| recorder.seen().len() == 2).await);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let details = processor.fetch_workflow_information(id).await.unwrap();
    assert_eq!(details.task("p5").unwrap().state, TaskState::Submitted);
    assert_eq!(recorder.seen().len(), 2);

    let unbounded = harness.coordinator("unbounded", succeed()).await;
    let transactions = unbounded.transactions();
    assert!(
        wait_until(|| {
            transactions
                .fetch_workflow_information(id)
                .map(|d| d.complete.is_some())
                .unwrap_or(false)
        })
        .await
    );

    unbounded.shutdown().await;
    processor.shutdown().await;
}

/// Test: Typed routing
/// Given a GPU-only processor and an untyped processor
/// When a workflow mixes a typed root with untyped tasks
/// Then each task runs on the processor servicing its queue
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_typed_tasks_route_to_their_queue() {
    let harness = Harness::new();
    let gpu = Recorder::default();
    let general = Recorder::default();
    let gpu_node = harness
        .start(&config("gpu-node").with_task_types(["gpu"]), gpu.handler())
        .await;
    let general_node = harness.coordinator("general-node", general.handler()).await;

    let workflow = Workflow::new("routed")
        .with_task(Task::new("train", "train").with_type("gpu"))
        .unwrap()
        .with_task(Task::new("plot", "plot"))
        .unwrap()
        .with_task(Task::new("report", "report").with_parents(["train", "plot"]))
        .unwrap();
    let id = general_node.submit_workflow(&workflow).await.unwrap();

    let transactions = general_node.transactions();
    assert!(
        wait_until(|| {
            transactions
                .fetch_workflow_information(id)
                .map(|d| d.complete.is_some())
                .unwrap_or(false)
        })
        .await
    );

    assert_eq!(gpu.seen(), vec!["train"]);
    let mut untyped = general.seen();
    untyped.sort();
    assert_eq!(untyped, vec!["plot", "report"]);

    gpu_node.shutdown().await;
    general_node.shutdown().await;
}
