//! Errors crossing the public scheduler API and the executor boundary.

use std::fmt;

use thiserror::Error;

use crate::registry::TaskId;

/// Error returned by [`crate::scheduler::Scheduler`] calls.
///
/// `Duplicate` is the only outcome a caller is expected to handle; every
/// transfer failure is resolved inside the scheduler and observed through
/// stats, events and the announcement log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task {0} is already queued")]
    Duplicate(TaskId),

    #[error("scheduler is shut down")]
    Closed,
}

/// How the retry policy should treat an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with backoff until the attempt ceiling.
    Transient,
    /// Retrying cannot help (e.g. the source is gone). Fails the task at once.
    Permanent,
    /// In-flight transfer aborted because connectivity was lost.
    NetworkLost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::NetworkLost => write!(f, "network lost"),
        }
    }
}

/// Failure reported by a transfer executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransferError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransferError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    pub fn network_lost() -> Self {
        Self {
            kind: FailureKind::NetworkLost,
            message: "transfer aborted: network offline".to_string(),
        }
    }

    /// Map an IO error: missing or forbidden sources are permanent, the rest transient.
    pub fn from_io(e: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
                Self::permanent(e.to_string())
            }
            _ => Self::transient(e.to_string()),
        }
    }
}
