//! Transaction scripts run against a [`Store`].
//!
//! Every public operation is exactly one `Store::atomically` call. A script
//! that returns an error leaves the store untouched, so a failed operation
//! never leaves a workflow half-advanced.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::keys::{self, field};
use super::{ClaimedTask, Transactions};
use crate::core::{
    Payload, Responsible, SubmittedTask, TaskDetails, TaskId, TaskName, TaskPriority, TaskState,
    TaskType, Timestamp, WorkflowDetails, WorkflowId, WorkflowSubmission,
};
use crate::dispatch::{self, PopRequest, QueueKey};
use crate::error::{Error, Result};
use crate::store::{Channel, Store, Transaction};

/// [`Transactions`] implemented as scripts over a shared store.
pub struct ScriptedTransactions<S> {
    store: Arc<S>,
}

impl<S> Clone for ScriptedTransactions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> ScriptedTransactions<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: Store> Transactions for ScriptedTransactions<S> {
    fn submit_workflow(
        &self,
        submission: &WorkflowSubmission,
        timestamp: &Timestamp,
    ) -> Result<WorkflowId> {
        check_submission(submission)?;
        let id = self
            .store
            .atomically(|tx| submit(tx, submission, timestamp))?;
        debug!(workflow = %id, name = %submission.name, tasks = submission.tasks.len(), "submitted workflow");
        Ok(id)
    }

    fn pop_task(
        &self,
        request: &PopRequest,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<Option<ClaimedTask>> {
        let claimed = self
            .store
            .atomically(|tx| pop(tx, request, timestamp, responsible))?;
        if let Some(task) = &claimed {
            debug!(task = %task.id, queue = %request.queue, %responsible, "claimed task");
        }
        Ok(claimed)
    }

    fn complete_task(
        &self,
        task: TaskId,
        timestamp: &Timestamp,
        responsible: &Responsible,
    ) -> Result<()> {
        debug!(%task, "complete task");
        self.store
            .atomically(|tx| complete(tx, task, timestamp, responsible))
    }

    fn fail_task(&self, task: TaskId, timestamp: &Timestamp) -> Result<()> {
        debug!(%task, "fail task");
        self.store.atomically(|tx| fail(tx, task, timestamp))
    }

    fn pop_complete_workflow(&self) -> Result<Option<WorkflowId>> {
        self.store
            .atomically(|tx| pop_workflow(tx, keys::WORKFLOW_COMPLETE))
    }

    fn pop_failed_workflow(&self) -> Result<Option<WorkflowId>> {
        self.store
            .atomically(|tx| pop_workflow(tx, keys::WORKFLOW_FAILED))
    }

    fn fetch_workflow_information(&self, workflow: WorkflowId) -> Result<WorkflowDetails> {
        self.store.atomically(|tx| fetch(tx, workflow))
    }

    fn pause_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()> {
        debug!(%workflow, "pause workflow");
        self.store.atomically(|tx| pause(tx, workflow, timestamp))
    }

    fn release_workflow(&self, workflow: WorkflowId, timestamp: &Timestamp) -> Result<()> {
        debug!(%workflow, "release workflow");
        self.store.atomically(|tx| release(tx, workflow, timestamp))
    }

    fn cleanup_workflow(&self, workflow: WorkflowId) -> Result<()> {
        debug!(%workflow, "cleanup workflow");
        self.store.atomically(|tx| cleanup(tx, workflow))
    }

    fn find_tasks_for(&self, responsible: &Responsible) -> Result<Vec<TaskId>> {
        self.store.atomically(|tx| {
            let key = keys::responsible(responsible);
            parse_ids(&key, tx.smembers(&key)?)
        })
    }

    fn resubmit_tasks_for(
        &self,
        responsible: &Responsible,
        timestamp: &Timestamp,
    ) -> Result<Vec<TaskId>> {
        let resubmitted = self
            .store
            .atomically(|tx| resubmit(tx, responsible, timestamp))?;
        for task in &resubmitted {
            info!(%task, %responsible, "resubmitted orphaned task");
        }
        Ok(resubmitted)
    }

    fn subscribe(&self) -> broadcast::Receiver<Channel> {
        self.store.subscribe()
    }
}

// ---------- record helpers ----------

fn corrupt(key: &str, detail: impl Into<String>) -> Error {
    Error::Corrupt {
        key: key.to_string(),
        detail: detail.into(),
    }
}

fn parse_field<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| corrupt(key, format!("'{}' is not a number", raw)))
}

/// Parse stored ids and sort them ascending.
fn parse_ids<T: FromStr + Ord>(key: &str, raw: Vec<String>) -> Result<Vec<T>> {
    let mut ids = raw
        .iter()
        .map(|r| parse_field(key, r))
        .collect::<Result<Vec<T>>>()?;
    ids.sort();
    Ok(ids)
}

fn next_id(tx: &mut Transaction<'_>, counter: &str) -> Result<u64> {
    let id = tx.incr(counter)?;
    u64::try_from(id).map_err(|_| corrupt(counter, format!("negative id {}", id)))
}

/// The parts of a `task:<id>` hash the scripts act on.
struct TaskRecord {
    fields: BTreeMap<String, String>,
    workflow: WorkflowId,
    queue: QueueKey,
    priority: TaskPriority,
}

impl TaskRecord {
    fn previous_state(&self) -> Option<&str> {
        self.fields.get(field::PREVIOUS_STATE).map(String::as_str)
    }

    fn last_known_responsible(&self) -> Option<Responsible> {
        self.fields
            .get(field::LAST_KNOWN_RESPONSIBLE)
            .map(|r| Responsible::from(r.as_str()))
    }

    fn paused_while_running(&self) -> bool {
        self.previous_state() == Some(keys::RESTORE_RUNNING)
    }
}

fn load_task(tx: &Transaction<'_>, id: TaskId) -> Result<Option<TaskRecord>> {
    let key = keys::task(id);
    let fields = tx.hgetall(&key)?;
    if fields.is_empty() {
        return Ok(None);
    }
    let workflow = match fields.get(field::WORKFLOW) {
        Some(raw) => parse_field(&key, raw)?,
        None => return Err(corrupt(&key, "no owning workflow")),
    };
    let task_type = fields
        .get(field::TYPE)
        .map(|t| TaskType::from(t.as_str()))
        .unwrap_or_default();
    let priority = match fields.get(field::PRIORITY) {
        Some(raw) => parse_field(&key, raw)?,
        None => TaskPriority::HIGHEST,
    };
    Ok(Some(TaskRecord {
        workflow,
        queue: QueueKey::for_type(&task_type),
        priority,
        fields,
    }))
}

fn task_state(tx: &Transaction<'_>, id: TaskId, record: &TaskRecord) -> Result<TaskState> {
    let member = id.to_string();
    let wf = record.workflow;
    let state = if record.fields.contains_key(field::COMPLETE) {
        TaskState::Complete
    } else if record.fields.contains_key(field::FAILED) {
        TaskState::Failed
    } else if tx.sismember(keys::ABANDONED, &member)? {
        TaskState::Abandoned
    } else if tx.sismember(&keys::running_in(wf), &member)? {
        TaskState::Running
    } else if tx.sismember(&keys::paused_in(wf), &member)? {
        TaskState::Paused
    } else if tx.sismember(&keys::submitted_in(wf), &member)? {
        TaskState::Submitted
    } else {
        TaskState::Blocked
    };
    Ok(state)
}

/// Put a ready task on its queue and announce it.
fn enqueue(
    tx: &mut Transaction<'_>,
    id: TaskId,
    workflow: WorkflowId,
    queue: &QueueKey,
    priority: TaskPriority,
    timestamp: &Timestamp,
) -> Result<()> {
    let member = id.to_string();
    tx.zadd(&queue.key(), &member, dispatch::score(priority))?;
    tx.sadd(&keys::submitted_in(workflow), &member)?;
    tx.hset(&keys::task(id), field::SUBMITTED, timestamp.as_str())?;
    tx.publish(queue.channel());
    Ok(())
}

/// Park a task in its workflow's paused set, remembering where it goes back to.
///
/// Tasks bound for a queue are also appended to the workflow's pause order,
/// so callers must hold them in the order they would have popped.
fn hold(
    tx: &mut Transaction<'_>,
    id: TaskId,
    workflow: WorkflowId,
    restore: &str,
    timestamp: &Timestamp,
) -> Result<()> {
    let key = keys::task(id);
    let member = id.to_string();
    tx.sadd(&keys::paused_in(workflow), &member)?;
    if restore != keys::RESTORE_RUNNING {
        tx.rpush(&keys::paused_order(workflow), member)?;
    }
    tx.hset(&key, field::PREVIOUS_STATE, restore)?;
    tx.hset(&key, field::PAUSED, timestamp.as_str())
}

// ---------- submission ----------

/// Reject a submission that cannot be persisted, before any id is allocated.
fn check_submission(submission: &WorkflowSubmission) -> Result<()> {
    if submission.tasks.is_empty() {
        return Err(Error::Structural(format!(
            "workflow '{}' has no tasks",
            submission.name
        )));
    }
    let mut by_name: HashMap<&TaskName, &SubmittedTask> = HashMap::new();
    for task in &submission.tasks {
        if by_name.insert(&task.name, task).is_some() {
            return Err(Error::DuplicateTask {
                workflow: submission.name.to_string(),
                task: task.name.to_string(),
            });
        }
    }
    for task in &submission.tasks {
        if let Some(parent) = task.parents.iter().find(|p| !by_name.contains_key(p)) {
            return Err(Error::Structural(format!(
                "task '{}' declares undeclared parent '{}'",
                task.name, parent
            )));
        }
    }
    if !submission.has_root() {
        return Err(Error::NoRoot {
            workflow: submission.name.to_string(),
        });
    }

    // Both ends must record every edge, or completion would miscount parents.
    // Children that were never declared are dropped at submission instead.
    for task in &submission.tasks {
        for child in &task.children {
            let Some(declared) = by_name.get(child) else {
                continue;
            };
            if !declared.parents.contains(&task.name) {
                return Err(Error::Structural(format!(
                    "task '{}' lists child '{}' but is not among its parents",
                    task.name, child
                )));
            }
        }
        for parent in &task.parents {
            if !by_name
                .get(parent)
                .is_some_and(|p| p.children.contains(&task.name))
            {
                return Err(Error::Structural(format!(
                    "task '{}' lists parent '{}' but is not among its children",
                    task.name, parent
                )));
            }
        }
    }

    let mut graph: DiGraph<&TaskName, ()> = DiGraph::new();
    let nodes: HashMap<&TaskName, NodeIndex> = submission
        .tasks
        .iter()
        .map(|t| (&t.name, graph.add_node(&t.name)))
        .collect();
    for task in &submission.tasks {
        for parent in &task.parents {
            if let (Some(&from), Some(&to)) = (nodes.get(parent), nodes.get(&task.name)) {
                graph.add_edge(from, to, ());
            }
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

fn submit(
    tx: &mut Transaction<'_>,
    submission: &WorkflowSubmission,
    timestamp: &Timestamp,
) -> Result<WorkflowId> {
    let wf = WorkflowId(next_id(tx, keys::CURRENT_WORKFLOW_ID)?);

    let mut ids: HashMap<&TaskName, TaskId> = HashMap::new();
    let mut allocated = Vec::with_capacity(submission.tasks.len());
    for task in &submission.tasks {
        let id = TaskId(next_id(tx, keys::CURRENT_TASK_ID)?);
        ids.insert(&task.name, id);
        allocated.push(id);
    }

    for (task, &id) in submission.tasks.iter().zip(&allocated) {
        let key = keys::task(id);
        let member = id.to_string();
        tx.hset(&key, field::NAME, task.name.as_str())?;
        tx.hset(&key, field::WORKFLOW, wf.to_string())?;
        tx.hset(&key, field::PAYLOAD, task.payload.as_str())?;
        tx.hset(&key, field::TYPE, task.task_type.as_str())?;
        tx.hset(&key, field::PRIORITY, task.priority.to_string())?;

        for parent in &task.parents {
            let parent_id = ids.get(parent).ok_or_else(|| {
                Error::Structural(format!("undeclared parent '{}'", parent))
            })?;
            tx.sadd(&keys::parents(id), &parent_id.to_string())?;
        }
        for child in &task.children {
            if let Some(child_id) = ids.get(child) {
                tx.rpush(&keys::children(id), child_id.to_string())?;
            }
        }

        if task.parents.is_empty() {
            let queue = QueueKey::for_type(&task.task_type);
            enqueue(tx, id, wf, &queue, task.priority, timestamp)?;
        }

        tx.sadd(keys::TASKS, &member)?;
        tx.rpush(&keys::workflow_tasks(wf), member)?;
    }

    let total = submission.tasks.len().to_string();
    let task_list = allocated
        .iter()
        .map(TaskId::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let wf_key = keys::workflow(wf);
    tx.set(&keys::remaining(wf), total.clone())?;
    tx.hset(&wf_key, field::NAME, submission.name.as_str())?;
    tx.hset(&wf_key, field::TASKS, task_list)?;
    tx.hset(&wf_key, field::TOTAL, total)?;
    tx.sadd(keys::WORKFLOWS, &wf.to_string())?;
    Ok(wf)
}

// ---------- execution ----------

fn pop(
    tx: &mut Transaction<'_>,
    request: &PopRequest,
    timestamp: &Timestamp,
    responsible: &Responsible,
) -> Result<Option<ClaimedTask>> {
    let queue = request.queue.key();
    let Some((member, _)) = tx.zpopmin(&queue, request.max_score())? else {
        return Ok(None);
    };
    let id: TaskId = parse_field(&queue, &member)?;
    let key = keys::task(id);
    let record = load_task(tx, id)?.ok_or_else(|| corrupt(&key, "queued task has no record"))?;
    let wf = record.workflow;

    tx.sadd(keys::RUNNING, &member)?;
    tx.sadd(&keys::running_in(wf), &member)?;
    tx.srem(&keys::submitted_in(wf), &member)?;
    tx.hset(&key, field::RUNNING, timestamp.as_str())?;
    tx.hset(&key, field::PREVIOUS_STATE, queue)?;
    tx.hset(&key, field::LAST_KNOWN_RESPONSIBLE, responsible.as_str())?;
    tx.sadd(&keys::responsible(responsible), &member)?;

    let payload = record
        .fields
        .get(field::PAYLOAD)
        .map(|p| Payload::from(p.as_str()))
        .unwrap_or_default();
    Ok(Some(ClaimedTask { id, payload }))
}

/// Load a task that is allowed to finish: running, or paused mid-execution.
fn claimed(tx: &Transaction<'_>, id: TaskId, operation: &'static str) -> Result<TaskRecord> {
    let Some(record) = load_task(tx, id)? else {
        return Err(Error::ProtocolViolation {
            task: id,
            operation,
            state: "unknown".to_string(),
        });
    };
    let member = id.to_string();
    if tx.sismember(keys::RUNNING, &member)? {
        return Ok(record);
    }
    if record.paused_while_running()
        && tx.sismember(&keys::paused_in(record.workflow), &member)?
    {
        return Ok(record);
    }
    let state = task_state(tx, id, &record)?;
    Err(Error::ProtocolViolation {
        task: id,
        operation,
        state: state.to_string(),
    })
}

/// Take a finishing task out of the active sets and its claimants' ownership.
fn retire(
    tx: &mut Transaction<'_>,
    id: TaskId,
    record: &TaskRecord,
    responsible: Option<&Responsible>,
) -> Result<()> {
    let member = id.to_string();
    let wf = record.workflow;
    tx.srem(keys::RUNNING, &member)?;
    tx.srem(&keys::running_in(wf), &member)?;
    tx.srem(&keys::paused_in(wf), &member)?;
    if let Some(who) = responsible {
        tx.srem(&keys::responsible(who), &member)?;
    }
    if let Some(who) = record.last_known_responsible() {
        tx.srem(&keys::responsible(&who), &member)?;
    }
    Ok(())
}

fn complete(
    tx: &mut Transaction<'_>,
    id: TaskId,
    timestamp: &Timestamp,
    responsible: &Responsible,
) -> Result<()> {
    let member = id.to_string();
    if tx.srem(keys::ABANDONED, &member)? {
        debug!(task = %id, "abandoned task finished");
        return Ok(());
    }
    let record = claimed(tx, id, "complete")?;
    let wf = record.workflow;
    retire(tx, id, &record, Some(responsible))?;
    tx.hset(&keys::task(id), field::COMPLETE, timestamp.as_str())?;
    tx.sadd(keys::COMPLETE, &member)?;
    let remaining = tx.decr(&keys::remaining(wf))?;

    let wf_key = keys::workflow(wf);
    if tx.hget(&wf_key, field::FAILED)?.is_some() {
        return Ok(());
    }
    if remaining <= 0 {
        tx.lpush(keys::WORKFLOW_COMPLETE, wf.to_string())?;
        tx.hset(&wf_key, field::COMPLETE, timestamp.as_str())?;
        tx.publish(Channel::WorkflowComplete);
        return Ok(());
    }

    let paused = tx.hget(&wf_key, field::PAUSED)?.is_some();
    let children_key = keys::children(id);
    for raw in tx.lrange(&children_key)? {
        let child: TaskId = parse_field(&children_key, &raw)?;
        let parents = keys::parents(child);
        tx.srem(&parents, &member)?;
        if tx.scard(&parents)? > 0 {
            continue;
        }
        let Some(child_record) = load_task(tx, child)? else {
            continue;
        };
        // A repeated edge reaches a child that was already promoted.
        if task_state(tx, child, &child_record)? != TaskState::Blocked {
            continue;
        }
        if paused {
            hold(tx, child, wf, &child_record.queue.key(), timestamp)?;
        } else {
            enqueue(
                tx,
                child,
                wf,
                &child_record.queue,
                child_record.priority,
                timestamp,
            )?;
        }
    }
    Ok(())
}

fn fail(tx: &mut Transaction<'_>, id: TaskId, timestamp: &Timestamp) -> Result<()> {
    let member = id.to_string();
    if tx.srem(keys::ABANDONED, &member)? {
        debug!(task = %id, "abandoned task failed");
        return Ok(());
    }
    let record = claimed(tx, id, "fail")?;
    let wf = record.workflow;
    retire(tx, id, &record, None)?;
    tx.hset(&keys::task(id), field::FAILED, timestamp.as_str())?;
    tx.sadd(keys::FAILED, &member)?;
    tx.decr(&keys::remaining(wf))?;

    let wf_key = keys::workflow(wf);
    if tx.hget(&wf_key, field::FAILED)?.is_none() {
        tx.hset(&wf_key, field::FAILED, timestamp.as_str())?;
    }
    tx.lpush(keys::WORKFLOW_FAILED, wf.to_string())?;
    tx.publish(Channel::WorkflowFailed);
    Ok(())
}

fn pop_workflow(tx: &mut Transaction<'_>, list: &str) -> Result<Option<WorkflowId>> {
    match tx.rpop(list)? {
        Some(raw) => Ok(Some(parse_field(list, &raw)?)),
        None => Ok(None),
    }
}

// ---------- observability ----------

fn fetch(tx: &mut Transaction<'_>, wf: WorkflowId) -> Result<WorkflowDetails> {
    let wf_key = keys::workflow(wf);
    let fields = tx.hgetall(&wf_key)?;
    if fields.is_empty() {
        return Err(Error::UnknownWorkflow(wf));
    }
    let tasks_key = keys::workflow_tasks(wf);
    let task_ids: Vec<TaskId> = parse_ids(&tasks_key, tx.lrange(&tasks_key)?)?;

    // Parent sets shrink as tasks complete; the child lists keep every edge.
    let mut children: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    let mut parents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for &id in &task_ids {
        let key = keys::children(id);
        let kids: Vec<TaskId> = tx
            .lrange(&key)?
            .iter()
            .map(|raw| parse_field(&key, raw))
            .collect::<Result<_>>()?;
        for &kid in &kids {
            parents.entry(kid).or_default().push(id);
        }
        children.insert(id, kids);
    }

    let mut tasks = Vec::with_capacity(task_ids.len());
    for id in task_ids {
        let Some(record) = load_task(tx, id)? else {
            continue;
        };
        let state = task_state(tx, id, &record)?;
        let text = |name: &str| record.fields.get(name).cloned();
        tasks.push(TaskDetails {
            id,
            name: TaskName::from(text(field::NAME).unwrap_or_default()),
            workflow: wf,
            payload: Payload::from(text(field::PAYLOAD).unwrap_or_default()),
            task_type: record.queue.task_type(),
            priority: record.priority,
            state,
            parents: parents.remove(&id).unwrap_or_default(),
            children: children.remove(&id).unwrap_or_default(),
            submitted: text(field::SUBMITTED),
            running: text(field::RUNNING),
            paused: text(field::PAUSED),
            complete: text(field::COMPLETE),
            failed: text(field::FAILED),
            previous_state: text(field::PREVIOUS_STATE),
            last_known_responsible: record.last_known_responsible(),
        });
    }

    let total = match fields.get(field::TOTAL) {
        Some(raw) => parse_field(&wf_key, raw)?,
        None => tasks.len() as u64,
    };
    let remaining_key = keys::remaining(wf);
    let remaining = match tx.get(&remaining_key)? {
        Some(raw) => parse_field(&remaining_key, &raw)?,
        None => 0,
    };
    Ok(WorkflowDetails {
        id: wf,
        name: fields.get(field::NAME).cloned().unwrap_or_default(),
        total,
        remaining,
        complete: fields.get(field::COMPLETE).cloned(),
        failed: fields.get(field::FAILED).cloned(),
        paused: fields.get(field::PAUSED).cloned(),
        tasks,
    })
}

// ---------- pause and release ----------

fn pause(tx: &mut Transaction<'_>, wf: WorkflowId, timestamp: &Timestamp) -> Result<()> {
    let wf_key = keys::workflow(wf);
    if !tx.exists(&wf_key) {
        return Err(Error::UnknownWorkflow(wf));
    }
    if tx.hget(&wf_key, field::PAUSED)?.is_some() {
        return Ok(());
    }
    tx.hset(&wf_key, field::PAUSED, timestamp.as_str())?;

    let submitted_key = keys::submitted_in(wf);
    let waiting: HashSet<String> = tx.smembers(&submitted_key)?.into_iter().collect();
    let mut queues = BTreeSet::new();
    for id in parse_ids::<TaskId>(&submitted_key, waiting.iter().cloned().collect())? {
        if let Some(record) = load_task(tx, id)? {
            queues.insert(record.queue.key());
        }
    }
    // Walk each queue in pop order so release can put them back the same way.
    for queue in queues {
        for member in tx.zrange(&queue)? {
            if !waiting.contains(&member) {
                continue;
            }
            let id: TaskId = parse_field(&queue, &member)?;
            tx.zrem(&queue, &member)?;
            tx.srem(&submitted_key, &member)?;
            hold(tx, id, wf, &queue, timestamp)?;
        }
    }
    for id in parse_ids::<TaskId>(&submitted_key, tx.smembers(&submitted_key)?)? {
        tx.srem(&submitted_key, &id.to_string())?;
        if let Some(record) = load_task(tx, id)? {
            hold(tx, id, wf, &record.queue.key(), timestamp)?;
        }
    }

    let running_key = keys::running_in(wf);
    for id in parse_ids::<TaskId>(&running_key, tx.smembers(&running_key)?)? {
        let member = id.to_string();
        tx.srem(keys::RUNNING, &member)?;
        tx.srem(&running_key, &member)?;
        hold(tx, id, wf, keys::RESTORE_RUNNING, timestamp)?;
    }
    Ok(())
}

fn release(tx: &mut Transaction<'_>, wf: WorkflowId, timestamp: &Timestamp) -> Result<()> {
    let wf_key = keys::workflow(wf);
    if !tx.exists(&wf_key) {
        return Err(Error::UnknownWorkflow(wf));
    }
    let paused_key = keys::paused_in(wf);
    let order_key = keys::paused_order(wf);
    let ordered: Vec<TaskId> = tx
        .lrange(&order_key)?
        .iter()
        .map(|raw| parse_field(&order_key, raw))
        .collect::<Result<_>>()?;
    let rest: Vec<TaskId> = parse_ids(&paused_key, tx.smembers(&paused_key)?)?;
    tx.del(&order_key);
    for id in ordered.into_iter().chain(rest) {
        let member = id.to_string();
        if !tx.srem(&paused_key, &member)? {
            continue;
        }
        let Some(record) = load_task(tx, id)? else {
            continue;
        };
        let previous = record.previous_state().unwrap_or_default().to_string();
        if previous == keys::RESTORE_RUNNING {
            tx.sadd(keys::RUNNING, &member)?;
            tx.sadd(&keys::running_in(wf), &member)?;
        } else if let Some(queue) = QueueKey::parse(&previous) {
            enqueue(tx, id, wf, &queue, record.priority, timestamp)?;
        } else {
            return Err(Error::InvalidRelease { task: id, previous });
        }
    }
    tx.hdel(&wf_key, field::PAUSED)?;
    Ok(())
}

// ---------- cleanup and recovery ----------

fn cleanup(tx: &mut Transaction<'_>, wf: WorkflowId) -> Result<()> {
    let tasks_key = keys::workflow_tasks(wf);
    let paused_key = keys::paused_in(wf);
    for raw in tx.lrange(&tasks_key)? {
        let id: TaskId = parse_field(&tasks_key, &raw)?;
        let member = id.to_string();
        tx.srem(keys::TASKS, &member)?;
        if let Some(record) = load_task(tx, id)? {
            tx.zrem(&record.queue.key(), &member)?;
            let moved = tx.smove(keys::RUNNING, keys::ABANDONED, &member)?;
            if !moved && record.paused_while_running() && tx.sismember(&paused_key, &member)? {
                tx.sadd(keys::ABANDONED, &member)?;
            }
            if let Some(who) = record.last_known_responsible() {
                tx.srem(&keys::responsible(&who), &member)?;
            }
        }
        tx.srem(keys::COMPLETE, &member)?;
        tx.srem(keys::FAILED, &member)?;
        tx.del(&keys::task(id));
        tx.del(&keys::parents(id));
        tx.del(&keys::children(id));
    }

    let wf_member = wf.to_string();
    tx.lrem(keys::WORKFLOW_COMPLETE, &wf_member)?;
    tx.lrem(keys::WORKFLOW_FAILED, &wf_member)?;
    tx.srem(keys::WORKFLOWS, &wf_member)?;
    for key in [
        tasks_key,
        keys::remaining(wf),
        keys::submitted_in(wf),
        keys::running_in(wf),
        paused_key,
        keys::paused_order(wf),
        keys::workflow(wf),
    ] {
        tx.del(&key);
    }
    Ok(())
}

fn resubmit(
    tx: &mut Transaction<'_>,
    responsible: &Responsible,
    timestamp: &Timestamp,
) -> Result<Vec<TaskId>> {
    let owned_key = keys::responsible(responsible);
    let owned: Vec<TaskId> = parse_ids(&owned_key, tx.smembers(&owned_key)?)?;
    tx.del(&owned_key);

    let mut resubmitted = Vec::new();
    for id in owned {
        let Some(record) = load_task(tx, id)? else {
            continue;
        };
        let member = id.to_string();
        let wf = record.workflow;
        let key = keys::task(id);
        if tx.srem(keys::RUNNING, &member)? {
            tx.srem(&keys::running_in(wf), &member)?;
            tx.hdel(&key, field::RUNNING)?;
            tx.hset(&key, field::PREVIOUS_STATE, record.queue.key())?;
            enqueue(tx, id, wf, &record.queue, record.priority, timestamp)?;
            resubmitted.push(id);
        } else if record.paused_while_running() && tx.sismember(&keys::paused_in(wf), &member)? {
            // Stays paused; release puts it back on its queue instead of into running.
            tx.hdel(&key, field::RUNNING)?;
            tx.hset(&key, field::PREVIOUS_STATE, record.queue.key())?;
            tx.rpush(&keys::paused_order(wf), member)?;
            resubmitted.push(id);
        }
    }
    Ok(resubmitted)
}
