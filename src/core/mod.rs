//! Core domain models for dagflow.
//!
//! This module contains the value types, task and workflow declarations,
//! and the read-only snapshots returned by the store.

pub mod details;
pub mod ids;
pub mod task;
pub mod workflow;

pub use details::{TaskDetails, WorkflowDetails};
pub use ids::{
    Payload, Responsible, TaskId, TaskName, TaskPriority, TaskType, Timestamp, WorkflowId,
    WorkflowName,
};
pub use task::{Task, TaskState};
pub use workflow::{SubmittedTask, Workflow, WorkflowSubmission};
