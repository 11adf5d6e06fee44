//! Synchronous scheduler state machine.
//!
//! The engine owns the registry, the monitor flags and the in-flight table.
//! The actor is its only caller; every method takes `now` so the engine can be
//! driven directly in tests without a runtime.

use std::sync::Arc;

use tokio::time::Instant;

use crate::config::{RetentionConfig, XferConfig};
use crate::control::{AbortReason, AbortToken, TransferControl};
use crate::error::{FailureKind, SchedulerError, TransferError};
use crate::monitor::{Directive, ResourceMonitor};
use crate::observe::{Announcement, AnnouncementLog, QueueStats, SchedulerEvent};
use crate::registry::{Accepted, Finish, TaskId, TaskInput, TaskRegistry, TaskState, TaskView};
use crate::retry::{RetryDecision, RetryPolicy};

use super::admission;
use super::executor::TransferOutcome;
use super::message::Signal;

/// Executor run the actor must spawn.
#[derive(Debug)]
pub(crate) struct Launch<P> {
    pub(crate) id: TaskId,
    pub(crate) run: u64,
    pub(crate) payload: Arc<P>,
    pub(crate) token: AbortToken,
}

/// Run of a task whose abort has been requested but not yet acknowledged.
pub(crate) type PendingAbort = (TaskId, u64);

pub(crate) struct Engine<P> {
    registry: TaskRegistry<P>,
    monitor: ResourceMonitor,
    control: TransferControl,
    policy: RetryPolicy,
    retention: RetentionConfig,
    announcements: AnnouncementLog,
    events: Vec<SchedulerEvent>,
    processing: bool,
}

impl<P> Engine<P> {
    pub(crate) fn new(cfg: &XferConfig) -> Self {
        Self {
            registry: TaskRegistry::new(),
            monitor: ResourceMonitor::new(cfg.max_concurrency, cfg.memory_pressure_concurrency),
            control: TransferControl::new(),
            policy: cfg.retry_policy(),
            retention: cfg.retention(),
            announcements: AnnouncementLog::new(),
            events: Vec::new(),
            processing: false,
        }
    }

    pub(crate) fn enqueue(
        &mut self,
        input: TaskInput<P>,
        now: Instant,
    ) -> Result<Accepted, SchedulerError> {
        let priority = input.priority;
        match self.registry.enqueue(input, now) {
            Ok(accepted) => {
                tracing::debug!(id = %accepted.id, seq = accepted.seq, ?priority, "task queued");
                Ok(accepted)
            }
            Err(e) => {
                tracing::debug!(error = %e, "enqueue rejected");
                Err(e)
            }
        }
    }

    pub(crate) fn start(&mut self) {
        if !self.processing {
            tracing::info!("processing started");
            self.processing = true;
        }
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.monitor.set_user_paused(paused);
        tracing::info!(paused, "caller pause changed");
    }

    /// Queued tasks are cancelled at once; an active task is aborted and
    /// returned as pending until its executor reports.
    pub(crate) fn cancel(&mut self, id: &TaskId, now: Instant) -> Option<PendingAbort> {
        let state = self.registry.get(id)?.state;
        match state {
            TaskState::Queued => {
                self.finish_cancelled(id, now);
                None
            }
            TaskState::Active => {
                let run = self.control.request_abort(id, AbortReason::Cancel)?;
                tracing::info!(%id, run, "cancel requested for active transfer");
                Some((id.clone(), run))
            }
            _ => None,
        }
    }

    /// One pass over every live task.
    pub(crate) fn cancel_all(&mut self, now: Instant) -> Vec<PendingAbort> {
        let ids = self.registry.live_ids();
        tracing::info!(count = ids.len(), "cancel all");
        ids.iter().filter_map(|id| self.cancel(id, now)).collect()
    }

    pub(crate) fn signal(&mut self, signal: Signal) -> Vec<PendingAbort> {
        let directive = match signal {
            Signal::Network { online } => self.monitor.on_network_change(online),
            Signal::Lifecycle(state) => self.monitor.on_app_lifecycle_change(state),
            Signal::MemoryWarning => self.monitor.on_memory_warning(),
            Signal::RestoreConcurrency => self.monitor.restore_concurrency(),
            Signal::SetMaxConcurrency(n) => self.monitor.set_max_concurrency(n),
        };
        match directive {
            Directive::AbortActive => {
                let aborted = self.control.abort_all(AbortReason::NetworkLost);
                tracing::info!(count = aborted.len(), "aborting active transfers");
                aborted
            }
            Directive::Continue => Vec::new(),
        }
    }

    pub(crate) fn on_progress(&mut self, id: &TaskId, run: u64, percent: i64) {
        if self.control.current(id, run).is_none() {
            return;
        }
        let Some(task) = self.registry.get_mut(id) else {
            return;
        };
        if task.record_progress(percent) {
            self.events.push(SchedulerEvent::Progress {
                id: id.clone(),
                percent: task.progress,
            });
        }
    }

    /// Apply an executor's final report.
    pub(crate) fn on_outcome(&mut self, id: &TaskId, run: u64, outcome: TransferOutcome, now: Instant) {
        let Some(flight) = self.control.current(id, run) else {
            tracing::warn!(%id, run, "stale executor report ignored");
            return;
        };
        let abort = flight.abort;
        self.control.unregister(id);
        if self.registry.get(id).map(|t| t.state) != Some(TaskState::Active) {
            tracing::warn!(%id, run, "report for inactive task ignored");
            return;
        }

        match (abort, outcome) {
            (Some(AbortReason::Cancel), _) => self.finish_cancelled(id, now),
            (_, TransferOutcome::Succeeded(receipt)) => self.finish_succeeded(id, receipt, now),
            (Some(AbortReason::NetworkLost | AbortReason::Shutdown), _) => {
                self.fail_attempt(id, TransferError::network_lost(), now)
            }
            (None, TransferOutcome::Failed(err)) => self.fail_attempt(id, err, now),
            (None, TransferOutcome::Aborted) => self.fail_attempt(
                id,
                TransferError::transient("executor aborted without a request"),
                now,
            ),
        }
    }

    /// Promote eligible tasks until the cap is reached.
    pub(crate) fn admit(&mut self, now: Instant) -> Vec<Launch<P>> {
        let mut launches = Vec::new();
        if !self.processing || self.monitor.is_paused() {
            return launches;
        }
        let cap = self.monitor.max_concurrency();
        let mut active = self.registry.count(TaskState::Active);
        while active < cap {
            let Some(id) = admission::pick_next(self.registry.iter(), now) else {
                break;
            };
            let Some(task) = self.registry.get_mut(&id) else {
                break;
            };
            task.start_attempt(now);
            let attempt = task.attempt;
            let payload = Arc::clone(&task.payload);
            let (run, token) = self.control.register(&id);
            tracing::info!(%id, attempt, run, active = active + 1, cap, "transfer admitted");
            self.announcements.push(Announcement::Started);
            self.events.push(SchedulerEvent::Admitted {
                id: id.clone(),
                attempt,
            });
            launches.push(Launch {
                id,
                run,
                payload,
                token,
            });
            active += 1;
        }
        launches
    }

    /// Earliest retry deadline worth waking up for.
    pub(crate) fn next_wakeup(&self, now: Instant) -> Option<Instant> {
        if !self.processing {
            return None;
        }
        admission::next_wakeup(self.registry.iter(), now)
    }

    pub(crate) fn is_settled(&self, pending: &PendingAbort) -> bool {
        self.control.current(&pending.0, pending.1).is_none()
    }

    /// Abort every in-flight run and stop admitting.
    pub(crate) fn shutdown(&mut self) {
        let aborted = self.control.abort_all(AbortReason::Shutdown);
        self.processing = false;
        tracing::info!(aborted = aborted.len(), "scheduler shutting down");
    }

    pub(crate) fn take_events(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn task(&self, id: &TaskId) -> Option<TaskView> {
        self.registry.get(id).map(|t| t.view())
    }

    pub(crate) fn tasks(&self) -> Vec<TaskView> {
        self.registry.all().into_iter().map(|t| t.view()).collect()
    }

    pub(crate) fn remove(&mut self, id: &TaskId) -> Option<TaskView> {
        let removed = self.registry.remove(id)?;
        tracing::debug!(%id, "finished task removed");
        Some(removed.view())
    }

    pub(crate) fn announcements(&self) -> &[String] {
        self.announcements.entries()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        let tally = self.registry.tally();
        QueueStats {
            queue_length: self.registry.count(TaskState::Queued),
            active_uploads: self.registry.count(TaskState::Active),
            completed_uploads: tally.succeeded,
            failed_uploads: tally.failed,
            cancelled_uploads: tally.cancelled,
            total_uploads: tally.accepted,
            max_concurrency: self.monitor.max_concurrency(),
            is_paused: self.monitor.is_paused(),
            is_memory_optimized: self.monitor.is_memory_optimized(),
            is_network_suspended: self.monitor.is_network_suspended(),
            is_processing: self.processing && !self.monitor.is_paused(),
            active_ids: self.registry.active_ids(),
        }
    }

    fn fail_attempt(&mut self, id: &TaskId, err: TransferError, now: Instant) {
        let Some(task) = self.registry.get_mut(id) else {
            return;
        };
        let attempt = task.attempt;
        match self.policy.decide(attempt, err.kind) {
            RetryDecision::RetryAfter(delay) => {
                task.requeue(now + delay);
                tracing::info!(%id, attempt, ?delay, kind = %err.kind, error = %err, "retry scheduled");
                self.events.push(SchedulerEvent::RetryScheduled {
                    id: id.clone(),
                    attempt,
                    delay,
                });
            }
            RetryDecision::GiveUp => {
                if err.kind == FailureKind::Permanent {
                    tracing::warn!(%id, attempt, error = %err, "transfer failed permanently");
                } else {
                    tracing::warn!(%id, attempt, error = %err, "transfer failed, attempts exhausted");
                }
                let message = err.to_string();
                self.registry.finish(id, now, Finish::Failed(message.clone()));
                self.announcements.push(Announcement::Failed);
                self.events.push(SchedulerEvent::Failed {
                    id: id.clone(),
                    error: message,
                });
                self.prune(now);
            }
        }
    }

    fn finish_succeeded(&mut self, id: &TaskId, receipt: Option<String>, now: Instant) {
        if !self.registry.finish(id, now, Finish::Succeeded(receipt)) {
            return;
        }
        tracing::info!(%id, "transfer completed");
        self.announcements.push(Announcement::Completed);
        self.events.push(SchedulerEvent::Succeeded { id: id.clone() });
        self.prune(now);
    }

    fn finish_cancelled(&mut self, id: &TaskId, now: Instant) {
        if !self.registry.finish(id, now, Finish::Cancelled) {
            return;
        }
        tracing::info!(%id, "transfer cancelled");
        self.announcements.push(Announcement::Cancelled);
        self.events.push(SchedulerEvent::Cancelled { id: id.clone() });
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        let dropped = self.registry.prune_finished(now, &self.retention);
        if dropped > 0 {
            tracing::debug!(dropped, "finished records pruned");
        }
    }
}
