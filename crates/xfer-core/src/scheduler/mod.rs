//! Transfer scheduler.
//!
//! Admits queued tasks up to the concurrency cap, retries failures with
//! exponential backoff, honours cancel/pause and host signals, and publishes
//! stats, events and announcements. State lives in a single actor task;
//! [`Scheduler`] is a cheap, cloneable handle to it.

mod actor;
mod admission;
mod engine;
mod executor;
mod message;

#[cfg(test)]
mod tests;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::XferConfig;
use crate::error::SchedulerError;
use crate::monitor::AppLifecycle;
use crate::observe::{QueueStats, SchedulerEvent};
use crate::registry::{Accepted, TaskId, TaskInput, TaskView};

pub use executor::{Executor, ProgressSink, TransferOutcome};
pub use message::Signal;

use actor::Actor;
use engine::Engine;
use message::Command;

const EVENT_CAPACITY: usize = 1024;

/// Handle to a running scheduler. Clones share the same actor.
pub struct Scheduler<P> {
    commands: mpsc::Sender<Command<P>>,
    stats: watch::Receiver<QueueStats>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl<P> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            stats: self.stats.clone(),
            events: self.events.clone(),
        }
    }
}

impl<P: Send + Sync + 'static> Scheduler<P> {
    /// Start the scheduler actor on the current tokio runtime.
    ///
    /// Tasks are accepted right away but nothing is admitted until
    /// [`start`](Self::start) is called.
    pub fn spawn<E: Executor<P>>(config: &XferConfig, executor: E) -> Self {
        let capacity = config.channel_capacity.max(1);
        let engine = Engine::new(config);
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (stats_tx, stats_rx) = watch::channel(engine.stats());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let actor = Actor::new(
            engine,
            std::sync::Arc::new(executor),
            commands_rx,
            capacity,
            stats_tx,
            events_tx.clone(),
        );
        tokio::spawn(actor.run());
        tracing::debug!(
            max_concurrency = config.max_concurrency,
            channel_capacity = capacity,
            "scheduler spawned"
        );
        Self {
            commands: commands_tx,
            stats: stats_rx,
            events: events_tx,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command<P>,
    ) -> Result<T, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SchedulerError::Closed)?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Queue a task. Fails with [`SchedulerError::Duplicate`] if the id is
    /// queued, active, or failed and not yet removed.
    pub async fn enqueue(&self, input: TaskInput<P>) -> Result<Accepted, SchedulerError> {
        self.request(|reply| Command::Enqueue { input, reply })
            .await?
    }

    /// Begin admitting tasks. Idempotent.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Stop admitting new tasks; active transfers keep running.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Cancel one task. Returns once it is `Cancelled`; unknown or finished
    /// ids are a no-op.
    pub async fn cancel(&self, id: impl Into<TaskId>) -> Result<(), SchedulerError> {
        let id = id.into();
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Cancel every queued and active task.
    pub async fn cancel_all(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::CancelAll { reply }).await
    }

    /// Deliver a host signal. Returns once any transfers it aborted have stopped.
    pub async fn signal(&self, signal: Signal) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Signal { signal, reply }).await
    }

    /// Offline aborts active transfers (they are re-queued) and suspends admission.
    pub async fn on_network_change(&self, online: bool) -> Result<(), SchedulerError> {
        self.signal(Signal::Network { online }).await
    }

    /// Background pauses admission only; active transfers continue.
    pub async fn on_app_lifecycle_change(&self, state: AppLifecycle) -> Result<(), SchedulerError> {
        self.signal(Signal::Lifecycle(state)).await
    }

    /// Drop to the memory-pressure cap until [`restore_concurrency`](Self::restore_concurrency).
    pub async fn on_memory_warning(&self) -> Result<(), SchedulerError> {
        self.signal(Signal::MemoryWarning).await
    }

    pub async fn restore_concurrency(&self) -> Result<(), SchedulerError> {
        self.signal(Signal::RestoreConcurrency).await
    }

    pub async fn set_max_concurrency(&self, n: usize) -> Result<(), SchedulerError> {
        self.signal(Signal::SetMaxConcurrency(n)).await
    }

    /// Current progress in percent; 0 for unknown ids.
    pub async fn progress(&self, id: impl Into<TaskId>) -> Result<u8, SchedulerError> {
        Ok(self.task(id).await?.map(|t| t.progress).unwrap_or(0))
    }

    pub async fn task(&self, id: impl Into<TaskId>) -> Result<Option<TaskView>, SchedulerError> {
        let id = id.into();
        self.request(|reply| Command::Task { id, reply }).await
    }

    /// Every known task in enqueue order.
    pub async fn tasks(&self) -> Result<Vec<TaskView>, SchedulerError> {
        self.request(|reply| Command::Tasks { reply }).await
    }

    /// Forget a finished task. Live tasks are not removed (`None`).
    pub async fn remove(&self, id: impl Into<TaskId>) -> Result<Option<TaskView>, SchedulerError> {
        let id = id.into();
        self.request(|reply| Command::Remove { id, reply }).await
    }

    pub async fn announcements(&self) -> Result<Vec<String>, SchedulerError> {
        self.request(|reply| Command::Announcements { reply }).await
    }

    /// Latest published stats. Never blocks.
    pub fn stats(&self) -> QueueStats {
        self.stats.borrow().clone()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<QueueStats> {
        self.stats.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Abort active transfers and stop the actor. Later calls fail with
    /// [`SchedulerError::Closed`].
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
