//! Aggregate queue counters (host-UI friendly).

use serde::Serialize;

use crate::registry::TaskId;

/// Snapshot of scheduler counters and flags.
///
/// `queue_length` and `active_uploads` are derived from live records;
/// the terminal counts and `total_uploads` are cumulative for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub active_uploads: usize,
    pub completed_uploads: usize,
    pub failed_uploads: usize,
    pub cancelled_uploads: usize,
    /// Every task ever accepted, terminal ones included.
    pub total_uploads: usize,
    pub max_concurrency: usize,
    pub is_paused: bool,
    pub is_memory_optimized: bool,
    pub is_network_suspended: bool,
    /// Started and not paused by any source.
    pub is_processing: bool,
    /// Active task ids in admission order.
    pub active_ids: Vec<TaskId>,
}

impl QueueStats {
    /// Tasks that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.completed_uploads + self.failed_uploads + self.cancelled_uploads
    }

    /// Nothing queued and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.queue_length == 0 && self.active_uploads == 0
    }
}
