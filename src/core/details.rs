//! Read-only snapshots of persisted workflow and task records.

use serde::{Deserialize, Serialize};

use super::ids::{Payload, Responsible, TaskId, TaskName, TaskPriority, TaskType, WorkflowId};
use super::task::TaskState;

/// Snapshot of one task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: TaskId,
    pub name: TaskName,
    pub workflow: WorkflowId,
    pub payload: Payload,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub parents: Vec<TaskId>,
    pub children: Vec<TaskId>,
    pub submitted: Option<String>,
    pub running: Option<String>,
    pub paused: Option<String>,
    pub complete: Option<String>,
    pub failed: Option<String>,
    pub previous_state: Option<String>,
    pub last_known_responsible: Option<Responsible>,
}

/// Snapshot of a workflow record and all of its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDetails {
    pub id: WorkflowId,
    pub name: String,
    pub total: u64,
    pub remaining: i64,
    pub complete: Option<String>,
    pub failed: Option<String>,
    pub paused: Option<String>,
    pub tasks: Vec<TaskDetails>,
}

impl WorkflowDetails {
    pub fn task(&self, name: &str) -> Option<&TaskDetails> {
        self.tasks.iter().find(|t| t.name.as_str() == name)
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }
}
