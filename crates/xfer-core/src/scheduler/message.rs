//! Actor mailbox: caller commands and executor reports.

use tokio::sync::oneshot;

use crate::error::SchedulerError;
use crate::monitor::AppLifecycle;
use crate::registry::{Accepted, TaskId, TaskInput, TaskView};

use super::executor::TransferOutcome;

/// Host signal delivered to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Network { online: bool },
    Lifecycle(AppLifecycle),
    MemoryWarning,
    RestoreConcurrency,
    SetMaxConcurrency(usize),
}

pub(crate) enum Command<P> {
    Enqueue {
        input: TaskInput<P>,
        reply: oneshot::Sender<Result<Accepted, SchedulerError>>,
    },
    Start {
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    /// Replies once the task is terminal (after the executor acknowledged, if active).
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<()>,
    },
    CancelAll {
        reply: oneshot::Sender<()>,
    },
    /// Replies once any aborts the signal caused are acknowledged.
    Signal {
        signal: Signal,
        reply: oneshot::Sender<()>,
    },
    Task {
        id: TaskId,
        reply: oneshot::Sender<Option<TaskView>>,
    },
    Tasks {
        reply: oneshot::Sender<Vec<TaskView>>,
    },
    Remove {
        id: TaskId,
        reply: oneshot::Sender<Option<TaskView>>,
    },
    Announcements {
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Sent by executor tasks; `run` ties the report to one admission.
#[derive(Debug)]
pub(crate) struct Report {
    pub(crate) id: TaskId,
    pub(crate) run: u64,
    pub(crate) kind: ReportKind,
}

#[derive(Debug)]
pub(crate) enum ReportKind {
    Progress(i64),
    Outcome(TransferOutcome),
}
