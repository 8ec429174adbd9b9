//! Workflow construction and validation.
//!
//! A `Workflow` collects task declarations keyed by name, checks the
//! structural invariants of the graph, and renders the wire payload
//! consumed by the submission transaction.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::ids::{Payload, TaskName, TaskPriority, TaskType, WorkflowName};
use super::task::Task;
use crate::error::{Error, Result};

/// A named set of tasks forming a DAG.
///
/// Tasks are unique by name. Edges are declared by name on either side
/// (a parent list on the child, a child list on the parent, or both).
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    name: WorkflowName,
    tasks: Vec<Task>,
    index: HashMap<TaskName, usize>,
}

impl Workflow {
    pub fn new(name: impl Into<WorkflowName>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Declare a task.
    ///
    /// # Errors
    /// Returns `DuplicateTask` if a task with the same name was already declared.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.index.contains_key(&task.name) {
            return Err(Error::DuplicateTask {
                workflow: self.name.to_string(),
                task: task.name.to_string(),
            });
        }
        self.index.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Builder-style variant of [`Workflow::add_task`].
    pub fn with_task(mut self, task: Task) -> Result<Self> {
        self.add_task(task)?;
        Ok(self)
    }

    pub fn name(&self) -> &WorkflowName {
        &self.name
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get_task(&self, name: &TaskName) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Check the structural invariants.
    ///
    /// # Errors
    /// - `Structural` if an edge names an undeclared task, a task type is
    ///   purely numeric, or the edges form a cycle.
    /// - `NoRoot` if no task is free of parents.
    pub fn validate(&self) -> Result<()> {
        for task in &self.tasks {
            for parent in &task.parents {
                if !self.index.contains_key(parent) {
                    return Err(Error::Structural(format!(
                        "task '{}' declares undeclared parent '{}'",
                        task.name, parent
                    )));
                }
            }
            for child in &task.children {
                if !self.index.contains_key(child) {
                    return Err(Error::Structural(format!(
                        "task '{}' declares undeclared child '{}'",
                        task.name, child
                    )));
                }
            }
            // `submitted:<n>` is the per-workflow set for workflow n.
            let ty = task.task_type.as_str();
            if !ty.is_empty() && ty.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::Structural(format!(
                    "task '{}' has numeric type '{}'",
                    task.name, ty
                )));
            }
        }

        let edges = self.edges();
        if !self
            .tasks
            .iter()
            .any(|t| edges.parents.get(&t.name).map_or(true, |p| p.is_empty()))
        {
            return Err(Error::NoRoot {
                workflow: self.name.to_string(),
            });
        }

        let mut graph: DiGraph<&TaskName, ()> = DiGraph::new();
        let nodes: HashMap<&TaskName, NodeIndex> = self
            .tasks
            .iter()
            .map(|t| (&t.name, graph.add_node(&t.name)))
            .collect();
        for task in &self.tasks {
            for child in edges.children.get(&task.name).into_iter().flatten() {
                graph.add_edge(nodes[&task.name], nodes[child], ());
            }
        }
        toposort(&graph, None).map_err(|cycle| {
            Error::Structural(format!(
                "cycle detected at task '{}'",
                graph[cycle.node_id()]
            ))
        })?;

        Ok(())
    }

    /// Validate and render the submission payload.
    ///
    /// Edges are normalised so that every parent/child relation appears on
    /// both ends, whichever side declared it.
    pub fn submission(&self) -> Result<WorkflowSubmission> {
        self.validate()?;
        let edges = self.edges();
        let tasks = self
            .tasks
            .iter()
            .map(|t| SubmittedTask {
                name: t.name.clone(),
                payload: t.payload.clone(),
                task_type: t.task_type.clone(),
                priority: t.priority,
                parents: edges.parents.get(&t.name).cloned().unwrap_or_default(),
                children: edges.children.get(&t.name).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(WorkflowSubmission {
            name: self.name.clone(),
            tasks,
        })
    }

    fn edges(&self) -> Edges {
        let mut edges = Edges::default();
        for task in &self.tasks {
            for parent in &task.parents {
                edges.link(parent, &task.name);
            }
            for child in &task.children {
                edges.link(&task.name, child);
            }
        }
        edges
    }
}

#[derive(Default)]
struct Edges {
    parents: HashMap<TaskName, Vec<TaskName>>,
    children: HashMap<TaskName, Vec<TaskName>>,
    seen: HashSet<(TaskName, TaskName)>,
}

impl Edges {
    fn link(&mut self, parent: &TaskName, child: &TaskName) {
        if !self.seen.insert((parent.clone(), child.clone())) {
            return;
        }
        self.children
            .entry(parent.clone())
            .or_default()
            .push(child.clone());
        self.parents
            .entry(child.clone())
            .or_default()
            .push(parent.clone());
    }
}

/// Wire payload for the submission transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowSubmission {
    pub name: WorkflowName,
    pub tasks: Vec<SubmittedTask>,
}

/// One task in a [`WorkflowSubmission`], with normalised edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmittedTask {
    pub name: TaskName,
    pub payload: Payload,
    #[serde(rename = "Type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub parents: Vec<TaskName>,
    #[serde(default)]
    pub children: Vec<TaskName>,
}

impl WorkflowSubmission {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn has_root(&self) -> bool {
        self.tasks.iter().any(|t| t.parents.is_empty())
    }
}
