//! Task definitions and the task lifecycle.
//!
//! A `Task` is the caller-side declaration of one node in a workflow:
//! its name, payload, routing type, priority and edges by name. Once
//! submitted, the store tracks the task's `TaskState`.

use serde::{Deserialize, Serialize};

use super::ids::{Payload, TaskName, TaskPriority, TaskType};

/// State of a submitted task.
///
/// `Blocked -> Submitted -> Running -> {Complete | Failed | Abandoned}`,
/// with `Submitted` and `Running` able to divert to `Paused` and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for at least one parent to complete.
    #[default]
    Blocked,
    /// Ready and queued for dispatch.
    Submitted,
    /// Claimed by a coordinator.
    Running,
    /// Held back because its workflow is paused.
    Paused,
    /// Finished successfully.
    Complete,
    /// Finished unsuccessfully.
    Failed,
    /// Detached from its workflow by cleanup while still running.
    Abandoned,
}

impl TaskState {
    /// Whether the task has reached an end state for its workflow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Failed | TaskState::Abandoned
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Blocked => write!(f, "blocked"),
            TaskState::Submitted => write!(f, "submitted"),
            TaskState::Running => write!(f, "running"),
            TaskState::Paused => write!(f, "paused"),
            TaskState::Complete => write!(f, "complete"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A task declaration within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique name within the workflow.
    pub name: TaskName,
    /// Opaque configuration passed to the task handler.
    pub payload: Payload,
    /// Dispatch queue; empty for the untyped queue.
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    /// Dispatch priority, 0 first.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Names of tasks that must complete first.
    #[serde(default)]
    pub parents: Vec<TaskName>,
    /// Names of tasks released by this one.
    #[serde(default)]
    pub children: Vec<TaskName>,
}

impl Task {
    /// Create an untyped, highest-priority task with no edges.
    pub fn new(name: impl Into<TaskName>, payload: impl Into<Payload>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            task_type: TaskType::untyped(),
            priority: TaskPriority::HIGHEST,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_type(mut self, task_type: impl Into<TaskType>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = TaskPriority(priority);
        self
    }

    pub fn with_parents<I, N>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TaskName>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TaskName>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// A root task has no declared parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}
