use thiserror::Error;

use crate::core::{TaskId, WorkflowId};
use crate::transactions::FaultPoint;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task '{task}' declared twice in workflow '{workflow}'")]
    DuplicateTask { workflow: String, task: String },

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Workflow '{workflow}' has no root task (every task has a parent)")]
    NoRoot { workflow: String },

    #[error("Cannot {operation} task {task}: it is {state}, expected running or abandoned")]
    ProtocolViolation {
        task: TaskId,
        operation: &'static str,
        state: String,
    },

    #[error("Cannot release task {task}: recorded previous state '{previous}' is not restorable")]
    InvalidRelease { task: TaskId, previous: String },

    #[error("Workflow not found: {0}")]
    UnknownWorkflow(WorkflowId),

    #[error("Key '{key}' holds the wrong kind of value (expected {expected})")]
    WrongType { key: String, expected: &'static str },

    #[error("Corrupt record at '{key}': {detail}")]
    Corrupt { key: String, detail: String },

    #[error("Injected fault at {0:?}")]
    InjectedFault(FaultPoint),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// True for errors raised while building or validating a workflow.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask { .. } | Error::Structural(_) | Error::NoRoot { .. }
        )
    }

    /// True for errors that indicate the persisted state disagrees with the protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation { .. } | Error::InvalidRelease { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
