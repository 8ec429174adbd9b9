use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, Sender};
use futures::future::try_join_all;

use dagflow::core::{Payload, Task, Workflow};
use dagflow::{
    Behaviours, Coordinator, CoordinatorConfig, CoordinatorEvent, Error, MemoryStore,
    ResultHandler, Result, ScriptedTransactions, TaskHandler, Transactions,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(60);

/// dagflow - DAG workflow execution over a shared transactional store
#[derive(Parser, Debug)]
#[command(name = "dagflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    DAGFLOW_DEBUG=1     Enable debug logging (alternative to --debug)\n    DAGFLOW_LOG=<filter> Log filter directive, e.g. dagflow=trace"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.dagflow/dagflow.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a four-task sample workflow and print its details
    Example,

    /// Push many nine-task chains through several coordinators and report throughput
    Bench {
        /// Number of workflows to submit
        #[arg(long, default_value_t = 1000)]
        workflows: usize,

        /// Number of processing coordinators
        #[arg(long, default_value_t = 4)]
        processors: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dagflow::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Example => run_example().await,
        Command::Bench {
            workflows,
            processors,
        } => run_bench(workflows, processors).await,
    }
}

fn sample_workflow() -> Result<Workflow> {
    Workflow::new("TestWorkflow")
        .with_task(Task::new("TestNode1", "Node1").with_children(["TestNode2"]))?
        .with_task(
            Task::new("TestNode2", "Node2")
                .with_parents(["TestNode1"])
                .with_children(["TestNode3", "TestNode4"]),
        )?
        .with_task(Task::new("TestNode3", "Node3").with_parents(["TestNode2"]))?
        .with_task(Task::new("TestNode4", "Node4").with_parents(["TestNode2"]))
}

fn chain_workflow(length: usize) -> Result<Workflow> {
    let mut workflow = Workflow::new("TestWorkflow");
    for i in 1..=length {
        let mut task = Task::new(i.to_string(), "payload");
        if i > 1 {
            task = task.with_parents([(i - 1).to_string()]);
        }
        workflow.add_task(task)?;
    }
    Ok(workflow)
}

/// Runs each payload on its own thread, the way a long-running job would.
fn threaded_handler() -> Arc<dyn TaskHandler> {
    Arc::new(|payload: Payload, result: ResultHandler| {
        thread::spawn(move || {
            println!("running {} (task {})", payload, result.task());
            thread::sleep(Duration::from_millis(50));
            result.on_success();
        });
    })
}

async fn run_example() -> Result<()> {
    let transactions: Arc<dyn Transactions> =
        Arc::new(ScriptedTransactions::new(Arc::new(MemoryStore::new())));
    let config = CoordinatorConfig::default().with_identifier("sampleApp");
    let coordinator = Coordinator::start(&config, transactions, threaded_handler()).await?;
    let events = coordinator.events();

    let id = coordinator.submit_workflow(&sample_workflow()?).await?;
    println!("Workflow pushed: {}", id);

    match wait_for_event(&events)? {
        CoordinatorEvent::WorkflowComplete { id, details } => {
            println!("workflow complete: {}", id);
            for task in &details.tasks {
                println!(
                    "  {:<10} {:<9} submitted={} complete={}",
                    task.name.as_str(),
                    task.state.to_string(),
                    task.submitted.as_deref().unwrap_or("-"),
                    task.complete.as_deref().unwrap_or("-"),
                );
            }
        }
        CoordinatorEvent::WorkflowFailed { id, .. } => println!("workflow failed: {}", id),
        CoordinatorEvent::Exception(err) => return Err(err),
    }

    coordinator.cleanup_workflow(id).await?;
    coordinator.shutdown().await;
    Ok(())
}

async fn run_bench(workflows: usize, processors: usize) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let transactions: Arc<dyn Transactions> = Arc::new(ScriptedTransactions::new(store));
    let succeed: Arc<dyn TaskHandler> =
        Arc::new(|_payload: Payload, result: ResultHandler| result.on_success());

    let submitter_config = CoordinatorConfig {
        behaviours: Behaviours {
            process_tasks: false,
            auto_restart: false,
        },
        ..CoordinatorConfig::default().with_identifier("sampleApp")
    };
    let mut coordinators = vec![
        Coordinator::start(&submitter_config, Arc::clone(&transactions), Arc::clone(&succeed))
            .await?,
    ];
    for i in 0..processors.max(1) {
        let config = CoordinatorConfig::default().with_identifier(format!("processor-{}", i));
        coordinators.push(
            Coordinator::start(&config, Arc::clone(&transactions), Arc::clone(&succeed)).await?,
        );
    }

    // Whichever coordinator pops a finished workflow raises its event.
    let (merged_tx, merged) = crossbeam_channel::unbounded();
    for coordinator in &coordinators {
        forward(coordinator.events(), merged_tx.clone());
    }
    drop(merged_tx);

    let workflow = chain_workflow(9)?;
    let submitter = &coordinators[0];
    let start = Instant::now();
    try_join_all((0..workflows).map(|_| submitter.submit_workflow(&workflow))).await?;
    let push = start.elapsed();

    let mut finished = 0;
    while finished < workflows {
        match wait_for_event(&merged)? {
            CoordinatorEvent::Exception(err) => return Err(err),
            _ => finished += 1,
        }
    }
    let total = start.elapsed();

    let tasks = workflows * 9;
    println!(
        "Done, {} in {} ms (push took {} ms, {:.0} per second) tasks: {} churn: {:.0} tasks per second",
        workflows,
        total.as_millis(),
        push.as_millis(),
        workflows as f64 / push.as_secs_f64().max(f64::EPSILON),
        tasks,
        tasks as f64 / total.as_secs_f64().max(f64::EPSILON),
    );

    for coordinator in coordinators {
        coordinator.shutdown().await;
    }
    Ok(())
}

fn forward(events: Receiver<CoordinatorEvent>, into: Sender<CoordinatorEvent>) {
    thread::spawn(move || {
        for event in events {
            if into.send(event).is_err() {
                break;
            }
        }
    });
}

fn wait_for_event(events: &Receiver<CoordinatorEvent>) -> Result<CoordinatorEvent> {
    events
        .recv_timeout(EVENT_TIMEOUT)
        .map_err(|_| Error::Timeout(EVENT_TIMEOUT))
}
