//! Throughput tests.
//!
//! Several processors share one store and push many chained workflows
//! through it. Every workflow must finish exactly once and within a
//! generous bound.
//!
//! Use `cargo test --test integration performance -- --nocapture` to see metrics.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures::future::try_join_all;

use dagflow::CoordinatorEvent;

use crate::fixtures::{chain, submit_only, succeed, Harness};

const WORKFLOWS: usize = 50;
const PROCESSORS: usize = 4;
const MAX_RUN_TIME: Duration = Duration::from_secs(30);

/// Test: Many workflows across many processors
/// Given four processors and one submitter on a shared store
/// When fifty nine-task chains are submitted concurrently
/// Then each workflow completes exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chains_across_processors_finish_once() {
    let harness = Harness::new();
    let submitter = harness.start(&submit_only("submitter"), succeed()).await;
    let mut processors = Vec::new();
    for i in 0..PROCESSORS {
        processors.push(
            harness
                .coordinator(&format!("processor-{}", i), succeed())
                .await,
        );
    }

    let names: Vec<String> = (1..=9).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let workflow = chain(&refs);

    let start = Instant::now();
    let submitted: HashSet<_> =
        try_join_all((0..WORKFLOWS).map(|_| submitter.submit_workflow(&workflow)))
            .await
            .unwrap()
            .into_iter()
            .collect();
    assert_eq!(submitted.len(), WORKFLOWS);

    let mut receivers = vec![submitter.events()];
    receivers.extend(processors.iter().map(|p| p.events()));

    let mut finished = HashSet::new();
    while finished.len() < WORKFLOWS {
        assert!(start.elapsed() < MAX_RUN_TIME, "timed out after {:?}", start.elapsed());
        let mut idle = true;
        for events in &receivers {
            while let Ok(event) = events.try_recv() {
                idle = false;
                match event {
                    CoordinatorEvent::WorkflowComplete { id, .. } => {
                        assert!(finished.insert(id), "workflow {} reported twice", id);
                    }
                    other => panic!("unexpected event {:?}", other),
                }
            }
        }
        if idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    let elapsed = start.elapsed();
    println!(
        "{} workflows ({} tasks) in {} ms",
        WORKFLOWS,
        WORKFLOWS * 9,
        elapsed.as_millis()
    );
    assert_eq!(finished, submitted);

    for processor in processors {
        processor.shutdown().await;
    }
    submitter.shutdown().await;
}
