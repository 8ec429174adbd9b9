use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{Responsible, TaskPriority, TaskType};
use crate::{Error, Result};

/// What a coordinator instance does besides submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviours {
    /// Claim and run tasks. A submit-only client turns this off.
    pub process_tasks: bool,
    /// Resubmit tasks still claimed under this identifier on start.
    pub auto_restart: bool,
}

impl Default for Behaviours {
    fn default() -> Self {
        Self {
            process_tasks: true,
            auto_restart: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Claimant identifier. Must be stable across restarts for recovery to work.
    pub identifier: Option<String>,
    /// Typed queues to service. Empty means the untyped queue.
    pub task_types: Vec<String>,
    /// Largest priority value this instance will claim.
    pub lowest_priority: Option<u32>,
    pub behaviours: Behaviours,
    pub clear_backlog_on_start: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            task_types: Vec::new(),
            lowest_priority: None,
            behaviours: Behaviours::default(),
            clear_backlog_on_start: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn dagflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".dagflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::dagflow_dir()?.join("dagflow.toml"))
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_task_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.task_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// The configured identifier, or a freshly generated one.
    pub fn effective_identifier(&self) -> Responsible {
        match self.identifier.as_deref() {
            Some(id) if !id.is_empty() => Responsible::from(id),
            _ => Responsible::generate(),
        }
    }

    pub fn serviced_types(&self) -> Vec<TaskType> {
        if self.task_types.is_empty() {
            return vec![TaskType::untyped()];
        }
        self.task_types
            .iter()
            .map(|t| TaskType::from(t.as_str()))
            .collect()
    }

    pub fn lowest_priority(&self) -> Option<TaskPriority> {
        self.lowest_priority.map(TaskPriority)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            identifier = ?config.identifier,
            task_types = ?config.task_types,
            lowest_priority = ?config.lowest_priority,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}
