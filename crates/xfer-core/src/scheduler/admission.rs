//! Which queued task gets the next free slot.

use std::cmp::Reverse;

use tokio::time::Instant;

use crate::registry::{Task, TaskId, TaskState};

/// Eligible task with the highest priority; ties go to the lowest enqueue seq.
pub(crate) fn pick_next<'a, P: 'a>(
    tasks: impl Iterator<Item = &'a Task<P>>,
    now: Instant,
) -> Option<TaskId> {
    tasks
        .filter(|t| t.is_eligible(now))
        .max_by_key(|t| (t.priority, Reverse(t.seq)))
        .map(|t| t.id.clone())
}

/// Earliest future instant at which a backing-off task becomes eligible.
pub(crate) fn next_wakeup<'a, P: 'a>(
    tasks: impl Iterator<Item = &'a Task<P>>,
    now: Instant,
) -> Option<Instant> {
    tasks
        .filter(|t| t.state == TaskState::Queued && t.next_eligible_at > now)
        .map(|t| t.next_eligible_at)
        .min()
}
