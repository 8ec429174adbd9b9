//! Dispatch queues for ready tasks.
//!
//! There is one untyped queue plus one queue per task type, created on first
//! use. Each queue is a sorted set scored by priority, so the lowest score
//! (highest priority) pops first and equal priorities pop in insertion order.

use crate::core::{TaskPriority, TaskType};
use crate::store::Channel;

const QUEUE_PREFIX: &str = "submitted";

/// Identifies one dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueKey {
    /// The default queue, `submitted`.
    Untyped,
    /// A type-routed queue, `submitted:<type>`.
    Typed(TaskType),
}

impl QueueKey {
    /// Queue serving tasks of `task_type`.
    pub fn for_type(task_type: &TaskType) -> Self {
        if task_type.is_untyped() {
            QueueKey::Untyped
        } else {
            QueueKey::Typed(task_type.clone())
        }
    }

    /// Parse a persisted queue key.
    ///
    /// Returns `None` for anything that is not a queue marker, such as
    /// the `running` restore target of a task paused mid-execution.
    pub fn parse(key: &str) -> Option<Self> {
        if key == QUEUE_PREFIX {
            return Some(QueueKey::Untyped);
        }
        let ty = key.strip_prefix(QUEUE_PREFIX)?.strip_prefix(':')?;
        if ty.is_empty() || ty.bytes().all(|b| b.is_ascii_digit()) {
            // `submitted:<n>` is a per-workflow set, not a queue.
            return None;
        }
        Some(QueueKey::Typed(TaskType::from(ty)))
    }

    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            QueueKey::Untyped => TaskType::untyped(),
            QueueKey::Typed(t) => t.clone(),
        }
    }

    /// Notification announcing new work on this queue.
    pub fn channel(&self) -> Channel {
        Channel::SubmittedTask(self.task_type())
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKey::Untyped => f.write_str(QUEUE_PREFIX),
            QueueKey::Typed(t) => write!(f, "{}:{}", QUEUE_PREFIX, t),
        }
    }
}

/// Sorted-set score for a priority.
pub fn score(priority: TaskPriority) -> i64 {
    i64::from(priority.value())
}

/// What a coordinator asks for when it pops a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopRequest {
    pub queue: QueueKey,
    /// Tasks with a larger priority value than this stay queued.
    pub lowest_priority: Option<TaskPriority>,
}

impl PopRequest {
    pub fn new(task_type: &TaskType) -> Self {
        Self {
            queue: QueueKey::for_type(task_type),
            lowest_priority: None,
        }
    }

    pub fn untyped() -> Self {
        Self::new(&TaskType::untyped())
    }

    pub fn with_lowest_priority(mut self, lowest: Option<TaskPriority>) -> Self {
        self.lowest_priority = lowest;
        self
    }

    /// Highest score this request may pop.
    pub fn max_score(&self) -> Option<i64> {
        self.lowest_priority.map(score)
    }
}
