//! Shared store abstraction.
//!
//! The transaction layer needs exactly three capabilities from its store:
//! keyed hash/set/sorted-set/list structures, scripted transactions that
//! apply atomically, and best-effort payload-less notifications. `Store`
//! captures those; `MemoryStore` is the in-process implementation.

pub mod keyspace;
mod memory;

pub use keyspace::{Keyspace, SortedSet, Transaction, Value};
pub use memory::MemoryStore;

use tokio::sync::broadcast;

use crate::core::TaskType;
use crate::error::Result;

/// Notification channels.
///
/// Messages carry no data; receivers re-query the relevant queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A task entered a dispatch queue (`submittedTask[:type]`).
    SubmittedTask(TaskType),
    /// A workflow was pushed onto `workflowComplete`.
    WorkflowComplete,
    /// A workflow was pushed onto `workflowFailed`.
    WorkflowFailed,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::SubmittedTask(t) if t.is_untyped() => write!(f, "submittedTask"),
            Channel::SubmittedTask(t) => write!(f, "submittedTask:{}", t),
            Channel::WorkflowComplete => write!(f, "workflowComplete"),
            Channel::WorkflowFailed => write!(f, "workflowFailed"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submittedTask" => Ok(Channel::SubmittedTask(TaskType::untyped())),
            "workflowComplete" => Ok(Channel::WorkflowComplete),
            "workflowFailed" => Ok(Channel::WorkflowFailed),
            other => match other.strip_prefix("submittedTask:") {
                Some(t) if !t.is_empty() => Ok(Channel::SubmittedTask(TaskType::from(t))),
                _ => Err(format!("unknown channel '{}'", other)),
            },
        }
    }
}

/// A store offering scripted transactions and notifications.
pub trait Store: Send + Sync + 'static {
    /// Run `script` as one indivisible unit.
    ///
    /// No other transaction interleaves with it. If the script returns an
    /// error every write it made is undone and its notifications are
    /// dropped; otherwise its notifications are published after commit.
    fn atomically<R, F>(&self, script: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>;

    /// Subscribe to every notification published after this call.
    fn subscribe(&self) -> broadcast::Receiver<Channel>;
}
