//! Atomic operations on shared workflow state.
//!
//! `Transactions` is the fixed catalog of state transitions. Each method is
//! one indivisible unit against the store: callers observe it either fully
//! applied or not at all. Nothing else reads or writes task and workflow
//! records.
//!
//! `ScriptedTransactions` implements the catalog against any [`Store`];
//! `FaultyTransactions` wraps another implementation and fails a chosen
//! operation, for exercising error paths.
//!
//! [`Store`]: crate::store::Store

mod faulty;
pub mod keys;
mod scripts;

pub use faulty::{FaultPoint, FaultyTransactions};
pub use scripts::ScriptedTransactions;

use tokio::sync::broadcast;

use crate::core::{
    Payload, Responsible, TaskId, Timestamp, WorkflowDetails, WorkflowId, WorkflowSubmission,
};
use crate::dispatch::PopRequest;
use crate::error::Result;
use crate::store::Channel;

/// A task handed out by [`Transactions::pop_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTask {
    pub id: TaskId,
    pub payload: Payload,
}

/// The catalog of atomic operations.
pub trait Transactions: Send + Sync {
    /// Persist a workflow and queue its root tasks.
    ///
    /// Allocates one workflow id and one task id per task. A submission
    /// without a root task is rejected before any id is allocated.
    fn submit_workflow(
        &self,
        submission: &WorkflowSubmission,
        timestamp: &Timestamp,
    ) -> Result<WorkflowId>;

    /// Claim the next ready task from the requested queue.
    ///
    /// `Ok(None)` when nothing is ready within the priority bound.
    fn pop_task(
        &self,
        request: &PopRequest,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<Option<ClaimedTask>>;

    /// Record a successful task and release any children it unblocks.
    fn complete_task(
        &self,
        task: TaskId,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<()>;

    /// Record a failed task and mark its workflow failed.
    fn fail_task(&self, task: TaskId, timestamp: &Timestamp) -> Result<()>;

    fn pop_complete_workflow(&self) -> Result<Option<WorkflowId>>;

    fn pop_failed_workflow(&self) -> Result<Option<WorkflowId>>;

    /// Read-only snapshot of a workflow and its tasks.
    fn fetch_workflow_information(&self, workflow: WorkflowId) -> Result<WorkflowDetails>;

    fn pause_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()>;

    fn release_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()>;

    /// Remove every record of a workflow. Idempotent.
    fn cleanup_workflow(&self, workflow: WorkflowId) -> Result<()>;

    /// Task ids currently claimed by `responsible`, ascending.
    fn find_tasks_for(&self, responsible: &Responsible) -> Result<Vec<TaskId>>;

    /// Put every task claimed by `responsible` back into its queue.
    ///
    /// Returns the ids that were resubmitted.
    fn resubmit_tasks_for(
        &self,
        responsible: &Responsible,
        timestamp: &Timestamp,
    ) -> Result<Vec<TaskId>>;

    /// Notifications published by committed operations.
    fn subscribe(&self) -> broadcast::Receiver<Channel>;
}
