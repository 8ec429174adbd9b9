//! Persisted key layout.
//!
//! These names are shared with every other process working against the same
//! store and must not change.

use crate::core::{Responsible, TaskId, WorkflowId};

pub const TASKS: &str = "tasks";
pub const WORKFLOWS: &str = "workflows";
pub const RUNNING: &str = "running";
pub const COMPLETE: &str = "complete";
pub const FAILED: &str = "failed";
pub const ABANDONED: &str = "abandoned";
pub const CURRENT_WORKFLOW_ID: &str = "currentWorkflowId";
pub const CURRENT_TASK_ID: &str = "currentTaskId";
pub const WORKFLOW_COMPLETE: &str = "workflowComplete";
pub const WORKFLOW_FAILED: &str = "workflowFailed";

/// `previousState` of a task paused while it was executing.
pub const RESTORE_RUNNING: &str = "running";

pub fn task(id: TaskId) -> String {
    format!("task:{}", id)
}

pub fn parents(id: TaskId) -> String {
    format!("parents:{}", id)
}

pub fn children(id: TaskId) -> String {
    format!("children:{}", id)
}

pub fn workflow(id: WorkflowId) -> String {
    format!("workflow:{}", id)
}

/// Task ids of a workflow, in declaration order.
pub fn workflow_tasks(id: WorkflowId) -> String {
    format!("tasks:{}", id)
}

pub fn remaining(id: WorkflowId) -> String {
    format!("remaining:{}", id)
}

pub fn submitted_in(id: WorkflowId) -> String {
    format!("submitted:{}", id)
}

pub fn running_in(id: WorkflowId) -> String {
    format!("running:{}", id)
}

pub fn paused_in(id: WorkflowId) -> String {
    format!("paused:{}", id)
}

/// Queued tasks of a paused workflow, in the order they were waiting to pop.
pub fn paused_order(id: WorkflowId) -> String {
    format!("pausedOrder:{}", id)
}

pub fn responsible(who: &Responsible) -> String {
    format!("responsible:{}", who)
}

/// Field names of the `task:<id>` and `workflow:<id>` hashes.
pub mod field {
    pub const NAME: &str = "name";
    pub const WORKFLOW: &str = "workflow";
    pub const PAYLOAD: &str = "payload";
    pub const TYPE: &str = "type";
    pub const PRIORITY: &str = "priority";
    pub const SUBMITTED: &str = "submitted";
    pub const RUNNING: &str = "running";
    pub const PAUSED: &str = "paused";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
    pub const PREVIOUS_STATE: &str = "previousState";
    pub const LAST_KNOWN_RESPONSIBLE: &str = "lastKnownResponsible";
    pub const TASKS: &str = "tasks";
    pub const TOTAL: &str = "total";
}
