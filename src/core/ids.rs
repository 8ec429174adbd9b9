//! Opaque identifiers and value types shared by every layer.
//!
//! Names, types, payloads and claimant identifiers are thin string
//! wrappers; workflow and task ids are the numeric handles allocated by
//! the store at submission time.

use chrono::Local;
use serde::{Deserialize, Serialize};

macro_rules! string_value {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_value!(
    /// Human-readable workflow name. Not required to be unique.
    WorkflowName
);

string_value!(
    /// Task name, unique within its workflow.
    TaskName
);

string_value!(
    /// Routing key for dispatch. The empty type selects the untyped queue.
    TaskType
);

string_value!(
    /// Opaque execution configuration handed to the task handler.
    Payload
);

string_value!(
    /// Identifier of a coordinator instance that claims tasks.
    Responsible
);

impl TaskType {
    /// The default, untyped queue.
    pub fn untyped() -> Self {
        Self(String::new())
    }

    pub fn is_untyped(&self) -> bool {
        self.0.is_empty()
    }
}

impl Responsible {
    /// Generate a fresh, random claimant identifier.
    pub fn generate() -> Self {
        Self(format!("coordinator-{}", uuid::Uuid::new_v4()))
    }
}

/// Dispatch priority. Lower values run first; 0 is the highest priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskPriority(pub u32);

impl TaskPriority {
    pub const HIGHEST: TaskPriority = TaskPriority(0);

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

numeric_id!(
    /// Store-allocated workflow id. Never reused.
    WorkflowId
);

numeric_id!(
    /// Store-allocated task id. Never reused.
    TaskId
);

/// Wall-clock instant as persisted in task and workflow records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub String);

impl Timestamp {
    /// Rendering used by the persisted records.
    pub const FORMAT: &'static str = "%d/%m/%y %H:%M:%S%.3f";

    pub fn now() -> Self {
        Self(Local::now().format(Self::FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
