//! Executor contract: the pluggable code that actually moves bytes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::control::AbortToken;
use crate::error::TransferError;
use crate::registry::TaskId;

use super::message::{Report, ReportKind};

/// How one run of a transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Done; optional receipt (remote id, destination path, ...).
    Succeeded(Option<String>),
    Failed(TransferError),
    /// Stopped after seeing the abort token.
    Aborted,
}

/// Performs a single transfer attempt.
///
/// Called once per admission. Implementations should check `abort` at safe
/// points (or race [`AbortToken::aborted`]) and return
/// [`TransferOutcome::Aborted`] promptly; the scheduler waits for the report
/// before freeing the slot.
#[async_trait]
pub trait Executor<P>: Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    async fn execute(
        &self,
        payload: Arc<P>,
        progress: ProgressSink,
        abort: AbortToken,
    ) -> TransferOutcome;
}

/// Progress reporter handed to an executor. Lossy: if the scheduler mailbox is
/// full the update is dropped, the next one supersedes it.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    id: TaskId,
    run: u64,
    tx: mpsc::Sender<Report>,
}

impl ProgressSink {
    pub(crate) fn new(id: TaskId, run: u64, tx: mpsc::Sender<Report>) -> Self {
        Self { id, run, tx }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.id
    }

    /// Report percent complete. Values outside [0,100] are clamped by the scheduler.
    pub fn report(&self, percent: i64) {
        let report = Report {
            id: self.id.clone(),
            run: self.run,
            kind: ReportKind::Progress(percent),
        };
        if self.tx.try_send(report).is_err() {
            tracing::trace!(id = %self.id, percent, "progress update dropped");
        }
    }

    /// Report `done` of `total` units.
    pub fn report_fraction(&self, done: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) as u128 * 100 / total as u128) as i64
        };
        self.report(percent);
    }
}
