//! Task record, identifiers and the per-task state machine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Caller-supplied task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Admission priority. `High` wins the next free slot; it never evicts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Task state.
///
/// Transitions:
/// - Queued -> Active -> Succeeded
/// - Queued -> Active -> Queued (retry, until the attempt ceiling)
/// - Queued -> Active -> Failed (ceiling reached or permanent failure)
/// - Queued | Active -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Active,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// No further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Blocks re-submission of the same id. Only succeeded and cancelled
    /// records may be replaced; a failed one must be removed first.
    pub fn blocks_resubmit(self) -> bool {
        !matches!(self, TaskState::Succeeded | TaskState::Cancelled)
    }
}

/// What a caller submits.
#[derive(Debug, Clone)]
pub struct TaskInput<P> {
    pub id: TaskId,
    pub payload: P,
    pub priority: Priority,
}

impl<P> TaskInput<P> {
    pub fn new(id: impl Into<TaskId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn high_priority(self) -> Self {
        self.with_priority(Priority::High)
    }
}

/// A task in the registry.
#[derive(Debug)]
pub struct Task<P> {
    pub id: TaskId,
    pub payload: Arc<P>,
    pub priority: Priority,
    pub state: TaskState,
    /// Execution attempts so far (incremented on admission).
    pub attempt: u32,
    /// Enqueue order; FIFO tie-break within a priority band.
    pub seq: u64,
    /// Not admissible before this instant (retry backoff).
    pub next_eligible_at: Instant,
    pub progress: u8,
    /// Last failure reason while `Failed`.
    pub error: Option<String>,
    /// Result string from a successful executor, if any.
    pub receipt: Option<String>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

impl<P> Task<P> {
    pub(crate) fn new(input: TaskInput<P>, seq: u64, now: Instant) -> Self {
        Self {
            id: input.id,
            payload: Arc::new(input.payload),
            priority: input.priority,
            state: TaskState::Queued,
            attempt: 0,
            seq,
            next_eligible_at: now,
            progress: 0,
            error: None,
            receipt: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        self.state == TaskState::Queued && self.next_eligible_at <= now
    }

    /// Queued -> Active.
    pub(crate) fn start_attempt(&mut self, now: Instant) {
        self.state = TaskState::Active;
        self.attempt += 1;
        self.progress = 0;
        self.started_at = Some(now);
    }

    /// Record executor progress. Clamped to [0,100]; regressions are ignored.
    /// Returns true if the stored value changed.
    pub(crate) fn record_progress(&mut self, pct: i64) -> bool {
        if self.state != TaskState::Active {
            return false;
        }
        let pct = pct.clamp(0, 100) as u8;
        if pct <= self.progress {
            return false;
        }
        self.progress = pct;
        true
    }

    /// Active -> Queued, not admissible before `eligible_at`.
    pub(crate) fn requeue(&mut self, eligible_at: Instant) {
        self.state = TaskState::Queued;
        self.next_eligible_at = eligible_at;
        self.progress = 0;
    }

    pub(crate) fn mark_succeeded(&mut self, now: Instant, receipt: Option<String>) {
        self.state = TaskState::Succeeded;
        self.progress = 100;
        self.receipt = receipt;
        self.error = None;
        self.completed_at = Some(now);
    }

    pub(crate) fn mark_failed(&mut self, now: Instant, error: String) {
        self.state = TaskState::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }

    pub(crate) fn mark_cancelled(&mut self, now: Instant) {
        self.state = TaskState::Cancelled;
        self.error = None;
        self.completed_at = Some(now);
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            priority: self.priority,
            state: self.state,
            attempt: self.attempt,
            progress: self.progress,
            error: self.error.clone(),
            receipt: self.receipt.clone(),
        }
    }
}

/// Payload-free, serializable view of a task for callers and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub priority: Priority,
    pub state: TaskState,
    pub attempt: u32,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}
