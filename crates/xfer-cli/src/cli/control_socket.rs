//! Control socket: server (during `xfer run`) and client (for `xfer pause` etc.).
//! Protocol: one command per line, same words as the CLI subcommands:
//! "pause", "resume", "cancel <id>", "cancel-all", "network online|offline",
//! "lifecycle foreground|background", "memory-warning", "restore-concurrency",
//! "set-max-concurrency <n>".

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use xfer_core::monitor::AppLifecycle;
use xfer_core::registry::TaskId;
use xfer_core::scheduler::{Scheduler, Signal};

/// A command accepted on the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Cancel(TaskId),
    CancelAll,
    Signal(Signal),
}

impl ControlCommand {
    /// Parse one protocol line. Returns None for malformed input.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let arg = words.next();
        if words.next().is_some() {
            return None;
        }
        let cmd = match (verb, arg) {
            ("pause", None) => ControlCommand::Pause,
            ("resume", None) => ControlCommand::Resume,
            ("cancel", Some(id)) => ControlCommand::Cancel(TaskId::new(id)),
            ("cancel-all", None) => ControlCommand::CancelAll,
            ("network", Some("online")) => ControlCommand::Signal(Signal::Network { online: true }),
            ("network", Some("offline")) => {
                ControlCommand::Signal(Signal::Network { online: false })
            }
            ("lifecycle", Some("foreground")) => {
                ControlCommand::Signal(Signal::Lifecycle(AppLifecycle::Foreground))
            }
            ("lifecycle", Some("background")) => {
                ControlCommand::Signal(Signal::Lifecycle(AppLifecycle::Background))
            }
            ("memory-warning", None) => ControlCommand::Signal(Signal::MemoryWarning),
            ("restore-concurrency", None) => ControlCommand::Signal(Signal::RestoreConcurrency),
            ("set-max-concurrency", Some(n)) => {
                ControlCommand::Signal(Signal::SetMaxConcurrency(n.parse().ok()?))
            }
            _ => return None,
        };
        Some(cmd)
    }

    /// Forward to the scheduler.
    pub async fn apply<P: Send + Sync + 'static>(&self, scheduler: &Scheduler<P>) -> Result<()> {
        match self {
            ControlCommand::Pause => scheduler.pause().await?,
            ControlCommand::Resume => scheduler.resume().await?,
            ControlCommand::Cancel(id) => scheduler.cancel(id.clone()).await?,
            ControlCommand::CancelAll => scheduler.cancel_all().await?,
            ControlCommand::Signal(signal) => scheduler.signal(*signal).await?,
        }
        Ok(())
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Pause => write!(f, "pause"),
            ControlCommand::Resume => write!(f, "resume"),
            ControlCommand::Cancel(id) => write!(f, "cancel {id}"),
            ControlCommand::CancelAll => write!(f, "cancel-all"),
            ControlCommand::Signal(Signal::Network { online: true }) => write!(f, "network online"),
            ControlCommand::Signal(Signal::Network { online: false }) => {
                write!(f, "network offline")
            }
            ControlCommand::Signal(Signal::Lifecycle(AppLifecycle::Foreground)) => {
                write!(f, "lifecycle foreground")
            }
            ControlCommand::Signal(Signal::Lifecycle(AppLifecycle::Background)) => {
                write!(f, "lifecycle background")
            }
            ControlCommand::Signal(Signal::MemoryWarning) => write!(f, "memory-warning"),
            ControlCommand::Signal(Signal::RestoreConcurrency) => write!(f, "restore-concurrency"),
            ControlCommand::Signal(Signal::SetMaxConcurrency(n)) => {
                write!(f, "set-max-concurrency {n}")
            }
        }
    }
}

/// Spawns a task that listens on `path` and forwards each valid line to the
/// scheduler. Malformed lines are ignored.
pub fn spawn_control_listener<P: Send + Sync + 'static>(
    scheduler: Scheduler<P>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let Some(cmd) = ControlCommand::parse_line(&line) else {
                                tracing::debug!(line = %line.trim(), "ignoring malformed control line");
                                continue;
                            };
                            tracing::info!(command = %cmd, "control command");
                            if let Err(e) = cmd.apply(&scheduler).await {
                                tracing::warn!(command = %cmd, "control command failed: {:#}", e);
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command line to the control socket of a running `xfer run`.
pub async fn send_command(socket_path: &Path, cmd: &ControlCommand) -> Result<()> {
    if !socket_path.exists() {
        bail!(
            "no running `xfer run` (control socket {} not found)",
            socket_path.display()
        );
    }
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    let msg = format!("{cmd}\n");
    stream.write_all(msg.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
