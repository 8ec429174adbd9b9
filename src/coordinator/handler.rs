//! Task execution contract.
//!
//! The coordinator hands each claimed task's payload to a [`TaskHandler`]
//! together with a [`ResultHandler`]. The handler owns its concurrency: it
//! may report inline, hand the work to another thread and report later, or
//! never report at all, in which case the task stays running.

use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::warn;

use super::events::CoordinatorEvent;
use crate::core::{Payload, Responsible, TaskId, Timestamp};
use crate::error::Result;
use crate::transactions::Transactions;

/// Executes task payloads.
pub trait TaskHandler: Send + Sync + 'static {
    fn run(&self, payload: Payload, result: ResultHandler);
}

impl<F> TaskHandler for F
where
    F: Fn(Payload, ResultHandler) + Send + Sync + 'static,
{
    fn run(&self, payload: Payload, result: ResultHandler) {
        self(payload, result)
    }
}

/// Reports the outcome of one claimed task. Consumed by reporting.
///
/// Errors while recording the outcome are raised as
/// [`CoordinatorEvent::Exception`].
pub struct ResultHandler {
    task: TaskId,
    responsible: Responsible,
    transactions: Arc<dyn Transactions>,
    events: Sender<CoordinatorEvent>,
}

impl ResultHandler {
    pub(crate) fn new(
        task: TaskId,
        responsible: Responsible,
        transactions: Arc<dyn Transactions>,
        events: Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            task,
            responsible,
            transactions,
            events,
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn on_success(self) {
        let result = self
            .transactions
            .complete_task(self.task, &Timestamp::now(), &self.responsible);
        self.report(result);
    }

    pub fn on_failure(self) {
        let result = self.transactions.fail_task(self.task, &Timestamp::now());
        self.report(result);
    }

    fn report(&self, result: Result<()>) {
        if let Err(err) = result {
            warn!(task = %self.task, error = %err, "recording task result failed");
            let _ = self.events.send(CoordinatorEvent::Exception(err));
        }
    }
}

impl std::fmt::Debug for ResultHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandler")
            .field("task", &self.task)
            .field("responsible", &self.responsible)
            .finish()
    }
}
