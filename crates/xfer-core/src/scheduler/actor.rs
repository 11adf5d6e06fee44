//! The scheduler actor: single owner of the engine.
//!
//! Commands from [`super::Scheduler`] handles, executor reports and retry
//! timers are handled one at a time. After each one the actor re-runs
//! admission, spawns the resulting executor runs, publishes stats and events,
//! and only then replies, so a caller that awaited a command sees its effect.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use crate::error::TransferError;
use crate::observe::{QueueStats, SchedulerEvent};

use super::engine::{Engine, Launch, PendingAbort};
use super::executor::{Executor, ProgressSink, TransferOutcome};
use super::message::{Command, Report, ReportKind};

/// Reply held back until every listed abort has been acknowledged.
struct AbortWaiter {
    pending: Vec<PendingAbort>,
    reply: oneshot::Sender<()>,
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Actor<P: Send + Sync + 'static> {
    engine: Engine<P>,
    executor: Arc<dyn Executor<P>>,
    commands: mpsc::Receiver<Command<P>>,
    reports_rx: mpsc::Receiver<Report>,
    reports_tx: mpsc::Sender<Report>,
    stats_tx: watch::Sender<QueueStats>,
    events_tx: broadcast::Sender<SchedulerEvent>,
    waiters: Vec<AbortWaiter>,
}

impl<P: Send + Sync + 'static> Actor<P> {
    pub(crate) fn new(
        engine: Engine<P>,
        executor: Arc<dyn Executor<P>>,
        commands: mpsc::Receiver<Command<P>>,
        report_capacity: usize,
        stats_tx: watch::Sender<QueueStats>,
        events_tx: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(report_capacity.max(1));
        Self {
            engine,
            executor,
            commands,
            reports_rx,
            reports_tx,
            stats_tx,
            events_tx,
            waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("scheduler actor started");
        loop {
            let wakeup = self.engine.next_wakeup(Instant::now());
            let flow = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        // Every handle dropped.
                        self.engine.shutdown();
                        Flow::Stop
                    }
                },
                Some(report) = self.reports_rx.recv() => {
                    self.handle_report(report);
                    self.settle();
                    Flow::Continue
                }
                _ = sleep_until(wakeup.unwrap_or_else(Instant::now)), if wakeup.is_some() => {
                    tracing::trace!("retry timer fired");
                    self.settle();
                    Flow::Continue
                }
            };
            if let Flow::Stop = flow {
                break;
            }
        }
        tracing::debug!("scheduler actor stopped");
    }

    fn handle_command(&mut self, cmd: Command<P>) -> Flow {
        let now = Instant::now();
        match cmd {
            Command::Enqueue { input, reply } => {
                let result = self.engine.enqueue(input, now);
                self.settle();
                let _ = reply.send(result);
            }
            Command::Start { reply } => {
                self.engine.start();
                self.settle();
                let _ = reply.send(());
            }
            Command::Pause { reply } => {
                self.engine.set_paused(true);
                self.settle();
                let _ = reply.send(());
            }
            Command::Resume { reply } => {
                self.engine.set_paused(false);
                self.settle();
                let _ = reply.send(());
            }
            Command::Cancel { id, reply } => {
                let pending = self.engine.cancel(&id, now).into_iter().collect();
                self.waiters.push(AbortWaiter { pending, reply });
                self.settle();
            }
            Command::CancelAll { reply } => {
                let pending = self.engine.cancel_all(now);
                self.waiters.push(AbortWaiter { pending, reply });
                self.settle();
            }
            Command::Signal { signal, reply } => {
                tracing::debug!(?signal, "host signal");
                let pending = self.engine.signal(signal);
                self.waiters.push(AbortWaiter { pending, reply });
                self.settle();
            }
            Command::Task { id, reply } => {
                let _ = reply.send(self.engine.task(&id));
            }
            Command::Tasks { reply } => {
                let _ = reply.send(self.engine.tasks());
            }
            Command::Remove { id, reply } => {
                let removed = self.engine.remove(&id);
                self.settle();
                let _ = reply.send(removed);
            }
            Command::Announcements { reply } => {
                let _ = reply.send(self.engine.announcements().to_vec());
            }
            Command::Shutdown { reply } => {
                self.engine.shutdown();
                self.publish();
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn handle_report(&mut self, report: Report) {
        let now = Instant::now();
        match report.kind {
            ReportKind::Progress(percent) => self.engine.on_progress(&report.id, report.run, percent),
            ReportKind::Outcome(outcome) => {
                tracing::debug!(id = %report.id, run = report.run, ?outcome, "executor reported");
                self.engine.on_outcome(&report.id, report.run, outcome, now)
            }
        }
    }

    /// Admit, launch, publish, then release waiters whose aborts are acknowledged.
    fn settle(&mut self) {
        let launches = self.engine.admit(Instant::now());
        for launch in launches {
            self.launch(launch);
        }
        self.publish();

        let engine = &self.engine;
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.pending.iter().all(|p| engine.is_settled(p)));
        self.waiters = waiting;
        for waiter in done {
            let _ = waiter.reply.send(());
        }
    }

    fn publish(&mut self) {
        for event in self.engine.take_events() {
            // No subscribers is fine.
            let _ = self.events_tx.send(event);
        }
        let stats = self.engine.stats();
        self.stats_tx.send_if_modified(|current| {
            if *current == stats {
                false
            } else {
                *current = stats;
                true
            }
        });
    }

    /// Run the executor in its own task. The outer task turns a panic into a
    /// transient failure so the slot is always released.
    fn launch(&self, launch: Launch<P>) {
        let Launch {
            id,
            run,
            payload,
            token,
        } = launch;
        let executor = Arc::clone(&self.executor);
        let reports = self.reports_tx.clone();
        let sink = ProgressSink::new(id.clone(), run, reports.clone());
        tokio::spawn(async move {
            let handle =
                tokio::spawn(async move { executor.execute(payload, sink, token).await });
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(%id, run, error = %e, "executor task failed");
                    TransferOutcome::Failed(TransferError::transient(format!(
                        "executor panicked: {e}"
                    )))
                }
            };
            let report = Report {
                id,
                run,
                kind: ReportKind::Outcome(outcome),
            };
            // Closed only after shutdown.
            let _ = reports.send(report).await;
        });
    }
}
