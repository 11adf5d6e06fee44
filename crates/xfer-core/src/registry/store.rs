//! In-memory task store with duplicate detection and terminal tallies.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RetentionConfig;
use crate::error::SchedulerError;

use super::task::{Task, TaskId, TaskInput, TaskState};

/// Returned by a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub id: TaskId,
    /// Enqueue sequence number.
    pub seq: u64,
}

/// Cumulative counts since the registry was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub accepted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Canonical set of tasks.
#[derive(Debug)]
pub struct TaskRegistry<P> {
    tasks: HashMap<TaskId, Task<P>>,
    next_seq: u64,
    tally: Tally,
}

impl<P> Default for TaskRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TaskRegistry<P> {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            next_seq: 0,
            tally: Tally::default(),
        }
    }

    /// Insert a new queued task. A live record with the same id rejects the
    /// call; a succeeded or cancelled record is replaced.
    pub fn enqueue(&mut self, input: TaskInput<P>, now: Instant) -> Result<Accepted, SchedulerError> {
        if let Some(existing) = self.tasks.get(&input.id) {
            if existing.state.blocks_resubmit() {
                return Err(SchedulerError::Duplicate(input.id));
            }
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        let id = input.id.clone();
        self.tasks.insert(id.clone(), Task::new(input, seq, now));
        self.tally.accepted += 1;
        Ok(Accepted { id, seq })
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task<P>> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task<P>> {
        self.tasks.get_mut(id)
    }

    /// All tasks in enqueue order.
    pub fn all(&self) -> Vec<&Task<P>> {
        let mut tasks: Vec<&Task<P>> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    /// Remove a finished task. Live tasks are left alone (use cancel).
    pub fn remove(&mut self, id: &TaskId) -> Option<Task<P>> {
        match self.tasks.get(id) {
            Some(task) if task.state.is_terminal() => self.tasks.remove(id),
            _ => None,
        }
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.tasks.values().filter(|t| t.state == state).count()
    }

    /// Ids of active tasks, in admission order.
    pub fn active_ids(&self) -> Vec<TaskId> {
        let mut active: Vec<&Task<P>> = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Active)
            .collect();
        active.sort_by_key(|t| (t.started_at, t.seq));
        active.into_iter().map(|t| t.id.clone()).collect()
    }

    /// Ids of tasks that are not terminal, in enqueue order.
    pub fn live_ids(&self) -> Vec<TaskId> {
        self.all()
            .into_iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Task<P>> {
        self.tasks.values()
    }

    /// Move a task into a terminal state and count it once.
    pub(crate) fn finish(&mut self, id: &TaskId, now: Instant, outcome: Finish) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if task.state.is_terminal() {
            return false;
        }
        match outcome {
            Finish::Succeeded(receipt) => {
                task.mark_succeeded(now, receipt);
                self.tally.succeeded += 1;
            }
            Finish::Failed(error) => {
                task.mark_failed(now, error);
                self.tally.failed += 1;
            }
            Finish::Cancelled => {
                task.mark_cancelled(now);
                self.tally.cancelled += 1;
            }
        }
        true
    }

    /// Drop finished records past their retention. Returns how many were dropped.
    pub fn prune_finished(&mut self, now: Instant, retention: &RetentionConfig) -> usize {
        let before = self.tasks.len();
        let max_age = Duration::from_secs(retention.max_age_secs);
        self.tasks.retain(|_, t| match t.completed_at {
            Some(done) if t.state.is_terminal() => now.saturating_duration_since(done) < max_age,
            _ => true,
        });

        let mut finished: Vec<(Instant, u64, TaskId)> = self
            .tasks
            .values()
            .filter(|t| t.state.is_terminal())
            .map(|t| (t.completed_at.unwrap_or(t.created_at), t.seq, t.id.clone()))
            .collect();
        if finished.len() > retention.max_finished {
            finished.sort();
            let excess = finished.len() - retention.max_finished;
            for (_, _, id) in finished.into_iter().take(excess) {
                self.tasks.remove(&id);
            }
        }
        before - self.tasks.len()
    }
}

/// Terminal outcome applied through [`TaskRegistry::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Finish {
    Succeeded(Option<String>),
    Failed(String),
    Cancelled,
}
