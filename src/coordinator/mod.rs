//! The coordinator: a reactor that drives workflows from notifications.
//!
//! A `Coordinator` subscribes to the store's notifications and runs a
//! listener actor. Each notification is handled on the blocking pool, so a
//! slow task handler never delays delivery of the next notification:
//!
//! - `submittedTask[:type]`: claim one task from that queue and hand it to
//!   the [`TaskHandler`].
//! - `workflowComplete` / `workflowFailed`: pop one workflow and raise a
//!   [`CoordinatorEvent`] carrying its details.
//!
//! Notifications are best-effort. Missed ones are recovered by
//! [`Coordinator::clear_backlog`], which runs at start and whenever the
//! listener falls behind.

pub mod events;
pub mod handler;

pub use events::CoordinatorEvent;
pub use handler::{ResultHandler, TaskHandler};

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{spawn_blocking, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::core::{
    Responsible, TaskId, TaskType, Timestamp, Workflow, WorkflowDetails, WorkflowId,
};
use crate::dispatch::PopRequest;
use crate::error::{Error, Result};
use crate::store::Channel;
use crate::transactions::Transactions;

/// Run a store call on the blocking pool.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// State shared between the coordinator handle, its listener and the
/// blocking workers it spawns.
struct Shared {
    transactions: Arc<dyn Transactions>,
    handler: Arc<dyn TaskHandler>,
    identity: Responsible,
    requests: Vec<PopRequest>,
    process_tasks: bool,
    events: Sender<CoordinatorEvent>,
}

impl Shared {
    fn request_for(&self, task_type: &TaskType) -> Option<&PopRequest> {
        self.requests
            .iter()
            .find(|r| &r.queue.task_type() == task_type)
    }

    fn handle(&self, channel: &Channel) -> Result<()> {
        match channel {
            Channel::SubmittedTask(task_type) => {
                if !self.process_tasks {
                    return Ok(());
                }
                if let Some(request) = self.request_for(task_type) {
                    self.run_next(request)?;
                }
                Ok(())
            }
            Channel::WorkflowComplete => {
                self.finish_next(true)?;
                Ok(())
            }
            Channel::WorkflowFailed => {
                self.finish_next(false)?;
                Ok(())
            }
        }
    }

    /// Claim one task and hand it to the task handler.
    fn run_next(&self, request: &PopRequest) -> Result<bool> {
        let claimed = self
            .transactions
            .pop_task(request, &Timestamp::now(), &self.identity)?;
        let Some(task) = claimed else {
            return Ok(false);
        };
        let result = ResultHandler::new(
            task.id,
            self.identity.clone(),
            Arc::clone(&self.transactions),
            self.events.clone(),
        );
        self.handler.run(task.payload, result);
        Ok(true)
    }

    /// Pop one finished workflow and raise its event.
    fn finish_next(&self, complete: bool) -> Result<bool> {
        let popped = if complete {
            self.transactions.pop_complete_workflow()?
        } else {
            self.transactions.pop_failed_workflow()?
        };
        let Some(id) = popped else {
            return Ok(false);
        };
        let details = self.transactions.fetch_workflow_information(id)?;
        let event = if complete {
            info!(workflow = %id, "workflow complete");
            CoordinatorEvent::WorkflowComplete { id, details }
        } else {
            info!(workflow = %id, "workflow failed");
            CoordinatorEvent::WorkflowFailed { id, details }
        };
        let _ = self.events.send(event);
        Ok(true)
    }

    fn clear_backlog(&self) -> Result<()> {
        while self.finish_next(false)? {}
        while self.finish_next(true)? {}
        if self.process_tasks {
            for request in &self.requests {
                while self.run_next(request)? {}
            }
        }
        Ok(())
    }

    fn raise(&self, err: Error) {
        warn!(error = %err, "coordinator exception");
        let _ = self.events.send(CoordinatorEvent::Exception(err));
    }
}

/// A running coordinator instance.
///
/// Dropping it stops the listener; [`Coordinator::shutdown`] also waits
/// for the listener to exit.
pub struct Coordinator {
    shared: Arc<Shared>,
    events: Receiver<CoordinatorEvent>,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// Start a coordinator.
    ///
    /// Subscribes before doing anything else, then runs crash recovery for
    /// this instance's identifier (when `auto_restart` is set) and drains
    /// the backlog (when `clear_backlog_on_start` is set).
    pub async fn start(
        config: &CoordinatorConfig,
        transactions: Arc<dyn Transactions>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self> {
        let identity = config.effective_identifier();
        let requests = pop_requests(config);
        let (events_tx, events) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            transactions,
            handler,
            identity,
            requests,
            process_tasks: config.behaviours.process_tasks,
            events: events_tx,
        });

        let notifications = shared.transactions.subscribe();
        info!(identifier = %shared.identity, "starting coordinator");

        if config.behaviours.auto_restart {
            let worker = Arc::clone(&shared);
            let resubmitted = blocking(move || {
                worker
                    .transactions
                    .resubmit_tasks_for(&worker.identity, &Timestamp::now())
            })
            .await?;
            if !resubmitted.is_empty() {
                info!(count = resubmitted.len(), "recovered orphaned tasks");
            }
        }

        if config.clear_backlog_on_start {
            let worker = Arc::clone(&shared);
            blocking(move || worker.clear_backlog()).await?;
        }

        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            Arc::clone(&shared),
            notifications,
            cancel.clone(),
        ));

        Ok(Self {
            shared,
            events,
            cancel,
            listener: Some(listener),
        })
    }

    pub fn identifier(&self) -> &Responsible {
        &self.shared.identity
    }

    /// Receiver for workflow and exception events.
    pub fn events(&self) -> Receiver<CoordinatorEvent> {
        self.events.clone()
    }

    pub fn transactions(&self) -> Arc<dyn Transactions> {
        Arc::clone(&self.shared.transactions)
    }

    /// Validate and submit a workflow.
    pub async fn submit_workflow(&self, workflow: &Workflow) -> Result<WorkflowId> {
        let submission = workflow.submission()?;
        let transactions = self.transactions();
        blocking(move || transactions.submit_workflow(&submission, &Timestamp::now())).await
    }

    pub async fn pause_workflow(&self, workflow: WorkflowId) -> Result<()> {
        let transactions = self.transactions();
        blocking(move || transactions.pause_workflow(workflow, &Timestamp::now())).await
    }

    pub async fn release_workflow(&self, workflow: WorkflowId) -> Result<()> {
        let transactions = self.transactions();
        blocking(move || transactions.release_workflow(workflow, &Timestamp::now())).await
    }

    pub async fn cleanup_workflow(&self, workflow: WorkflowId) -> Result<()> {
        let transactions = self.transactions();
        blocking(move || transactions.cleanup_workflow(workflow)).await
    }

    pub async fn fetch_workflow_information(&self, workflow: WorkflowId) -> Result<WorkflowDetails> {
        let transactions = self.transactions();
        blocking(move || transactions.fetch_workflow_information(workflow)).await
    }

    /// Tasks currently claimed by this instance.
    pub async fn owned_tasks(&self) -> Result<Vec<TaskId>> {
        let shared = Arc::clone(&self.shared);
        blocking(move || shared.transactions.find_tasks_for(&shared.identity)).await
    }

    /// Drain failed workflows, complete workflows and ready tasks until
    /// each source is empty.
    pub async fn clear_backlog(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        blocking(move || shared.clear_backlog()).await
    }

    /// Stop the listener and wait for it to exit.
    ///
    /// Task handlers already running are not interrupted.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(err) = listener.await {
                warn!(error = %err, "coordinator listener ended abnormally");
            }
        }
        debug!(identifier = %self.shared.identity, "coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One pop request per serviced queue; the untyped queue when no types are configured.
fn pop_requests(config: &CoordinatorConfig) -> Vec<PopRequest> {
    let lowest = config.lowest_priority();
    config
        .serviced_types()
        .iter()
        .map(|t| PopRequest::new(t).with_lowest_priority(lowest))
        .collect()
}

async fn listen(
    shared: Arc<Shared>,
    mut notifications: broadcast::Receiver<Channel>,
    cancel: CancellationToken,
) {
    debug!(identifier = %shared.identity, "listener started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("listener cancelled");
                break;
            }
            received = notifications.recv() => match received {
                Ok(channel) => {
                    let worker = Arc::clone(&shared);
                    let reporter = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = blocking(move || worker.handle(&channel)).await {
                            reporter.raise(err);
                        }
                    });
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "listener lagged, draining backlog");
                    let worker = Arc::clone(&shared);
                    let reporter = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = blocking(move || worker.clear_backlog()).await {
                            reporter.raise(err);
                        }
                    });
                }
                Err(RecvError::Closed) => {
                    debug!("notification channel closed");
                    break;
                }
            }
        }
    }
}
