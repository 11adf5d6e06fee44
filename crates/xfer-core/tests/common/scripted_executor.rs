//! Executor whose behaviour is chosen per task by its payload.
//!
//! `Hold` transfers run until the test releases them or the scheduler aborts
//! them, which makes slot accounting observable. Every call is recorded with
//! the (possibly paused) tokio clock so backoff timing can be asserted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use xfer_core::control::AbortToken;
use xfer_core::error::TransferError;
use xfer_core::observe::QueueStats;
use xfer_core::registry::TaskInput;
use xfer_core::scheduler::{Executor, ProgressSink, Scheduler, TransferOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Report 50%, then succeed.
    Instant,
    /// Run until released (success) or aborted.
    Hold,
    /// Fail transiently on every attempt.
    AlwaysFail,
    /// Panic on the first attempt, succeed afterwards.
    PanicOnce,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub mode: Mode,
}

pub fn job(name: &str, mode: Mode) -> TaskInput<Job> {
    TaskInput::new(
        name,
        Job {
            name: name.to_string(),
            mode,
        },
    )
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<(String, Instant)>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    shared: Arc<Shared>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, name: &str) -> Arc<Notify> {
        let mut gates = self.shared.gates.lock().unwrap();
        Arc::clone(gates.entry(name.to_string()).or_default())
    }

    /// Let a held transfer finish successfully.
    pub fn release(&self, name: &str) {
        self.gate(name).notify_one();
    }

    /// Instants at which `name` was started, in order.
    pub fn attempts(&self, name: &str) -> Vec<Instant> {
        self.shared
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Executor<Job> for ScriptedExecutor {
    async fn execute(
        &self,
        payload: Arc<Job>,
        progress: ProgressSink,
        abort: AbortToken,
    ) -> TransferOutcome {
        let previous = self.attempts(&payload.name).len();
        self.shared
            .calls
            .lock()
            .unwrap()
            .push((payload.name.clone(), Instant::now()));

        match payload.mode {
            Mode::Instant => {
                progress.report(50);
                TransferOutcome::Succeeded(Some(format!("receipt-{}", payload.name)))
            }
            Mode::Hold => {
                let gate = self.gate(&payload.name);
                tokio::select! {
                    _ = gate.notified() => TransferOutcome::Succeeded(None),
                    _ = abort.aborted() => TransferOutcome::Aborted,
                }
            }
            Mode::AlwaysFail => TransferOutcome::Failed(TransferError::transient("upstream 503")),
            Mode::PanicOnce => {
                if previous == 0 {
                    panic!("executor blew up");
                }
                TransferOutcome::Succeeded(None)
            }
        }
    }
}

/// Wait until the published stats satisfy `pred`; panics after a generous timeout.
pub async fn wait_for_stats(
    scheduler: &Scheduler<Job>,
    pred: impl FnMut(&QueueStats) -> bool,
) -> QueueStats {
    let mut rx = scheduler.subscribe_stats();
    let stats = tokio::time::timeout(Duration::from_secs(300), rx.wait_for(pred))
        .await
        .expect("stats condition not reached in time")
        .expect("scheduler stopped");
    stats.clone()
}
