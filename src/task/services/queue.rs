//! Priority task queue.
//!
//! Every task lives in one map; pending tasks are additionally indexed per
//! capability by `(priority descending, submission sequence)`. All mutation
//! goes through the methods below under a single lock, so callers never see
//! a task whose status and index membership disagree.

use crate::agent::domain::{AgentId, CapabilityTag};
use crate::task::domain::{Priority, Task, TaskDomainError, TaskFailure, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Queue-level errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No task exists with the identifier.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A task with the same identifier is already queued.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// Only pending tasks may be enqueued.
    #[error("task {task_id} is {status}, only pending tasks can be enqueued")]
    NotPending {
        /// Task identifier.
        task_id: TaskId,
        /// Status of the rejected task.
        status: TaskStatus,
    },

    /// The task already reached a terminal status.
    #[error("task {0} is already terminal")]
    AlreadyTerminal(TaskId),

    /// The lifecycle rejected the requested transition.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// The queue lock was poisoned by a panicking holder.
    #[error("task queue lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

type QueueKey = (Reverse<Priority>, u64);

#[derive(Debug, Default)]
struct QueueState {
    tasks: HashMap<TaskId, Task>,
    pending: HashMap<CapabilityTag, BTreeMap<QueueKey, TaskId>>,
    next_sequence: u64,
}

const fn key_for(task: &Task) -> QueueKey {
    (Reverse(task.priority()), task.sequence())
}

impl QueueState {
    fn index(&mut self, task: &Task) {
        self.pending
            .entry(task.capability().clone())
            .or_default()
            .insert(key_for(task), task.id());
    }

    fn unindex(&mut self, task: &Task) {
        if let Some(bucket) = self.pending.get_mut(task.capability()) {
            bucket.remove(&key_for(task));
            if bucket.is_empty() {
                self.pending.remove(task.capability());
            }
        }
    }

    fn task_mut(&mut self, id: TaskId) -> QueueResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))
    }
}

/// Thread-safe priority queue of tasks.
pub struct TaskQueue<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
    state: Mutex<QueueState>,
}

impl<C> TaskQueue<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty queue.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|err| QueueError::LockPoisoned(err.to_string()))
    }

    /// Adds a pending task; returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotPending`] for tasks past `pending` or
    /// [`QueueError::DuplicateTask`] when the identifier is already queued.
    pub fn enqueue(&self, mut task: Task) -> QueueResult<TaskId> {
        if task.status() != TaskStatus::Pending {
            return Err(QueueError::NotPending {
                task_id: task.id(),
                status: task.status(),
            });
        }
        let mut state = self.lock()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(QueueError::DuplicateTask(task.id()));
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        task.set_sequence(sequence);
        state.index(&task);
        let id = task.id();
        debug!(task_id = %id, capability = %task.capability(), priority = %task.priority(), "task enqueued");
        state.tasks.insert(id, task);
        Ok(id)
    }

    /// Assigns the most urgent dispatchable task of `capability`.
    ///
    /// Pending tasks are offered to `pick` in priority-then-submission order;
    /// the first for which `pick` returns an agent is marked `assigned` to
    /// it and returned. `pick` runs under the queue lock and must not call
    /// back into the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn dequeue_ready<F>(&self, capability: &CapabilityTag, mut pick: F) -> QueueResult<Option<Task>>
    where
        F: FnMut(&Task) -> Option<AgentId>,
    {
        let mut state = self.lock()?;
        let Some(bucket) = state.pending.get(capability) else {
            return Ok(None);
        };
        let ordered: Vec<TaskId> = bucket.values().copied().collect();

        for id in ordered {
            let Some(task) = state.tasks.get(&id) else {
                continue;
            };
            match pick(task) {
                Some(agent_id) => {
                    let mut assigned = task.clone();
                    assigned.assign(agent_id, &*self.clock)?;
                    state.unindex(&assigned);
                    state.tasks.insert(id, assigned.clone());
                    return Ok(Some(assigned));
                }
                // Without exclusions every later task sees the same agents.
                None if task.excluded_agents().is_empty() => break,
                None => {}
            }
        }
        Ok(None)
    }

    /// Returns a snapshot of one task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for unknown tasks.
    pub fn get(&self, id: TaskId) -> QueueResult<Task> {
        let state = self.lock()?;
        state.tasks.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    /// Lists tasks in submission order, optionally restricted to a status.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn list(&self, status: Option<TaskStatus>) -> QueueResult<Vec<Task>> {
        let state = self.lock()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| status.is_none_or(|wanted| task.status() == wanted))
            .cloned()
            .collect();
        tasks.sort_by_key(Task::sequence);
        Ok(tasks)
    }

    /// Returns capabilities that currently have pending tasks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn pending_capabilities(&self) -> QueueResult<Vec<CapabilityTag>> {
        let state = self.lock()?;
        let mut capabilities: Vec<CapabilityTag> = state.pending.keys().cloned().collect();
        capabilities.sort();
        Ok(capabilities)
    }

    /// Returns the number of pending tasks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn pending_len(&self) -> QueueResult<usize> {
        let state = self.lock()?;
        Ok(state.pending.values().map(BTreeMap::len).sum())
    }

    /// Marks an assigned task as running.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyTerminal`] when the task was cancelled in
    /// the meantime, or [`QueueError::Domain`] for other invalid moves.
    pub fn mark_running(&self, id: TaskId) -> QueueResult<Task> {
        self.update(id, |task, clock| task.start(clock))
    }

    /// Records a successful result.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyTerminal`] when the task was cancelled
    /// while running.
    pub fn complete(&self, id: TaskId, result: String) -> QueueResult<Task> {
        self.update(id, |task, clock| task.complete(result, clock))
    }

    /// Records a terminal failure.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyTerminal`] when the task was cancelled
    /// while running.
    pub fn fail(&self, id: TaskId, failure: TaskFailure) -> QueueResult<Task> {
        self.update(id, |task, clock| task.fail(failure, clock))
    }

    /// Returns a task to `pending` for one more attempt elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyTerminal`] when the task was cancelled
    /// while running.
    pub fn requeue_for_retry(&self, id: TaskId, failure: TaskFailure) -> QueueResult<Task> {
        let mut state = self.lock()?;
        let task = state.task_mut(id)?;
        guard_terminal(task)?;
        task.retry_after(failure, &*self.clock)?;
        let snapshot = task.clone();
        state.index(&snapshot);
        Ok(snapshot)
    }

    /// Returns a task to `pending` without consuming an attempt.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyTerminal`] when the task was cancelled
    /// while running.
    pub fn requeue(&self, id: TaskId) -> QueueResult<Task> {
        let mut state = self.lock()?;
        let task = state.task_mut(id)?;
        guard_terminal(task)?;
        task.release_to_pending(&*self.clock)?;
        let snapshot = task.clone();
        state.index(&snapshot);
        Ok(snapshot)
    }

    /// Cancels a task.
    ///
    /// Pending tasks leave the queue immediately. Assigned and running tasks
    /// are marked cancelled; the caller must signal the executor.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for unknown tasks and
    /// [`QueueError::AlreadyTerminal`] for finished ones, without side
    /// effects.
    pub fn cancel(&self, id: TaskId) -> QueueResult<Task> {
        let mut state = self.lock()?;
        let task = state.task_mut(id)?;
        guard_terminal(task)?;
        let was_pending = task.status() == TaskStatus::Pending;
        let before = task.clone();
        task.cancel(&*self.clock)?;
        let snapshot = task.clone();
        if was_pending {
            state.unindex(&before);
        }
        Ok(snapshot)
    }

    /// Drops terminal tasks that finished before `cutoff`; returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn purge_finished(&self, cutoff: DateTime<Utc>) -> QueueResult<usize> {
        let mut state = self.lock()?;
        let before = state.tasks.len();
        state.tasks.retain(|_, task| {
            !(task.status().is_terminal() && task.finished_at().is_some_and(|at| at < cutoff))
        });
        Ok(before - state.tasks.len())
    }

    /// Loads tasks recovered after a restart; returns how many were added.
    ///
    /// Tasks left `assigned` or `running` have no live execution and go back
    /// to `pending`. Known identifiers are skipped. Restored tasks keep their
    /// relative submission order but take fresh sequence numbers, so they
    /// queue behind equal-priority tasks already present.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockPoisoned`] when internal state is unusable.
    pub fn restore(&self, mut tasks: Vec<Task>) -> QueueResult<usize> {
        tasks.sort_by_key(Task::sequence);
        let mut state = self.lock()?;
        let mut restored = 0;
        for mut task in tasks {
            if state.tasks.contains_key(&task.id()) {
                warn!(task_id = %task.id(), "skipping restore of already queued task");
                continue;
            }
            if matches!(task.status(), TaskStatus::Assigned | TaskStatus::Running) {
                task.release_to_pending(&*self.clock)?;
                warn!(task_id = %task.id(), "requeued task orphaned by restart");
            }
            task.set_sequence(state.next_sequence);
            state.next_sequence += 1;
            if task.status() == TaskStatus::Pending {
                state.index(&task);
            }
            state.tasks.insert(task.id(), task);
            restored += 1;
        }
        Ok(restored)
    }

    fn update<F>(&self, id: TaskId, apply: F) -> QueueResult<Task>
    where
        F: FnOnce(&mut Task, &C) -> Result<(), TaskDomainError>,
    {
        let mut state = self.lock()?;
        let task = state.task_mut(id)?;
        guard_terminal(task)?;
        apply(task, &*self.clock)?;
        Ok(task.clone())
    }
}

fn guard_terminal(task: &Task) -> QueueResult<()> {
    if task.status().is_terminal() {
        return Err(QueueError::AlreadyTerminal(task.id()));
    }
    Ok(())
}
