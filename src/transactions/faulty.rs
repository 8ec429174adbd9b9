//! Fault-injection wrapper around another [`Transactions`] implementation.

use tokio::sync::broadcast;

use super::{ClaimedTask, Transactions};
use crate::core::{Responsible, TaskId, Timestamp, WorkflowDetails, WorkflowId, WorkflowSubmission};
use crate::dispatch::PopRequest;
use crate::error::{Error, Result};
use crate::store::Channel;

/// The operation a [`FaultyTransactions`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    PopTask,
    PopFailedWorkflow,
    PopCompleteWorkflow,
    CompleteTask,
    FailTask,
}

/// Delegates to `inner` except at the chosen fault point, where it errors.
///
/// The failing operation has no effect on the store.
pub struct FaultyTransactions<T> {
    inner: T,
    fault: FaultPoint,
}

impl<T: Transactions> FaultyTransactions<T> {
    pub fn new(inner: T, fault: FaultPoint) -> Self {
        Self { inner, fault }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn check(&self, point: FaultPoint) -> Result<()> {
        if self.fault == point {
            return Err(Error::InjectedFault(point));
        }
        Ok(())
    }
}

impl<T: Transactions> Transactions for FaultyTransactions<T> {
    fn submit_workflow(
        &self,
        submission: &WorkflowSubmission,
        timestamp: &Timestamp,
    ) -> Result<WorkflowId> {
        self.inner.submit_workflow(submission, timestamp)
    }

    fn pop_task(
        &self,
        request: &PopRequest,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<Option<ClaimedTask>> {
        self.check(FaultPoint::PopTask)?;
        self.inner.pop_task(request, timestamp, responsible)
    }

    fn complete_task(
        &self,
        task: TaskId,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<()> {
        self.check(FaultPoint::CompleteTask)?;
        self.inner.complete_task(task, timestamp, responsible)
    }

    fn fail_task(&self, task: TaskId, timestamp: &Timestamp) -> Result<()> {
        self.check(FaultPoint::FailTask)?;
        self.inner.fail_task(task, timestamp)
    }

    fn pop_complete_workflow(&self) -> Result<Option<WorkflowId>> {
        self.check(FaultPoint::PopCompleteWorkflow)?;
        self.inner.pop_complete_workflow()
    }

    fn pop_failed_workflow(&self) -> Result<Option<WorkflowId>> {
        self.check(FaultPoint::PopFailedWorkflow)?;
        self.inner.pop_failed_workflow()
    }

    fn fetch_workflow_information(&self, workflow: WorkflowId) -> Result<WorkflowDetails> {
        self.inner.fetch_workflow_information(workflow)
    }

    fn pause_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()> {
        self.inner.pause_workflow(workflow, timestamp)
    }

    fn release_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()> {
        self.inner.release_workflow(workflow, timestamp)
    }

    fn cleanup_workflow(&self, workflow: WorkflowId) -> Result<()> {
        self.inner.cleanup_workflow(workflow)
    }

    fn find_tasks_for(&self, responsible: &Responsible) -> Result<Vec<TaskId>> {
        self.inner.find_tasks_for(responsible)
    }

    fn resubmit_tasks_for(
        &self,
        responsible: &Responsible,
        timestamp: &Timestamp,
    ) -> Result<Vec<TaskId>> {
        self.inner.resubmit_tasks_for(responsible, timestamp)
    }

    fn subscribe(&self) -> broadcast::Receiver<Channel> {
        self.inner.subscribe()
    }
}
