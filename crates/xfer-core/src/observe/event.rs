use std::time::Duration;

use crate::registry::TaskId;

/// Transition broadcast to subscribers of [`crate::scheduler::Scheduler::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Admitted { id: TaskId, attempt: u32 },
    Progress { id: TaskId, percent: u8 },
    Succeeded { id: TaskId },
    RetryScheduled { id: TaskId, attempt: u32, delay: Duration },
    Failed { id: TaskId, error: String },
    Cancelled { id: TaskId },
}

impl SchedulerEvent {
    /// The task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerEvent::Succeeded { .. }
                | SchedulerEvent::Failed { .. }
                | SchedulerEvent::Cancelled { .. }
        )
    }
}
