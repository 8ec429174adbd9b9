//! Events raised to the caller by a running coordinator.

use crate::core::{WorkflowDetails, WorkflowId};
use crate::error::Error;

/// Something the caller may want to react to.
///
/// Delivered over a `crossbeam_channel` receiver obtained from
/// [`Coordinator::events`](super::Coordinator::events).
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Every task of the workflow completed.
    WorkflowComplete {
        id: WorkflowId,
        details: WorkflowDetails,
    },
    /// A task of the workflow failed.
    WorkflowFailed {
        id: WorkflowId,
        details: WorkflowDetails,
    },
    /// An operation failed while handling a notification or a task result.
    Exception(Error),
}

impl CoordinatorEvent {
    pub fn workflow_id(&self) -> Option<WorkflowId> {
        match self {
            CoordinatorEvent::WorkflowComplete { id, .. }
            | CoordinatorEvent::WorkflowFailed { id, .. } => Some(*id),
            CoordinatorEvent::Exception(_) => None,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, CoordinatorEvent::Exception(_))
    }
}
