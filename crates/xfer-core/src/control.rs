//! Cooperative cancellation: shared abort tokens and the in-flight table.
//!
//! Each admitted task gets an [`AbortToken`]. Cancellation and network loss
//! flip the token; the executor checks it at safe points (or awaits
//! [`AbortToken::aborted`]) and reports `Aborted`. Nothing is forcibly killed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::registry::TaskId;

/// Why an in-flight transfer was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Caller cancelled the task (single or bulk).
    Cancel,
    /// Connectivity lost; the task goes back to the queue.
    NetworkLost,
    /// Scheduler is shutting down.
    Shutdown,
}

#[derive(Debug, Default)]
struct TokenInner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Shared abort flag handed to an executor at admission time.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    inner: Arc<TokenInner>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abort. Idempotent.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// One admitted run of a task.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Run number; reports carrying another number are stale.
    pub run: u64,
    pub token: AbortToken,
    /// Set once an abort was requested; decides how the executor's report is read.
    pub abort: Option<AbortReason>,
}

/// Table of in-flight runs, keyed by task id. Owned by the scheduler engine.
#[derive(Debug, Default)]
pub struct TransferControl {
    runs: HashMap<TaskId, InFlight>,
    next_run: u64,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run; returns the run number and the token for the executor.
    pub fn register(&mut self, id: &TaskId) -> (u64, AbortToken) {
        self.next_run += 1;
        let token = AbortToken::new();
        self.runs.insert(
            id.clone(),
            InFlight {
                run: self.next_run,
                token: token.clone(),
                abort: None,
            },
        );
        (self.next_run, token)
    }

    /// The in-flight entry for `id` if `run` is its current run.
    pub fn current(&self, id: &TaskId, run: u64) -> Option<&InFlight> {
        self.runs.get(id).filter(|f| f.run == run)
    }

    /// Remove the run once its outcome has been applied.
    pub fn unregister(&mut self, id: &TaskId) -> Option<InFlight> {
        self.runs.remove(id)
    }

    /// Signal the token and remember why; returns the aborted run number.
    /// Cancel outranks the other reasons, otherwise the first reason is kept.
    pub fn request_abort(&mut self, id: &TaskId, reason: AbortReason) -> Option<u64> {
        let flight = self.runs.get_mut(id)?;
        flight.abort = Some(match (flight.abort, reason) {
            (Some(AbortReason::Cancel), _) | (_, AbortReason::Cancel) => AbortReason::Cancel,
            (Some(existing), _) => existing,
            (None, r) => r,
        });
        flight.token.abort();
        Some(flight.run)
    }

    /// Abort every in-flight run. Returns `(id, run)` for each.
    pub fn abort_all(&mut self, reason: AbortReason) -> Vec<(TaskId, u64)> {
        let ids: Vec<TaskId> = self.runs.keys().cloned().collect();
        ids.into_iter()
            .filter_map(|id| {
                let run = self.request_abort(&id, reason)?;
                Some((id, run))
            })
            .collect()
    }
}

/// Control socket of a running `xfer run` (XDG state dir, next to the log).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("xfer")?.get_state_home();
    Ok(dir.join("control.sock"))
}
