//! CLI for the xfer transfer scheduler.

mod commands;
mod control_socket;
mod copy_executor;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use xfer_core::config;
use xfer_core::monitor::AppLifecycle;
use xfer_core::scheduler::Signal;

use commands::{run_backoff, run_show_config, run_signal, run_transfers, RunOptions};
use control_socket::ControlCommand;

/// Top-level CLI for the xfer transfer scheduler.
#[derive(Debug, Parser)]
#[command(name = "xfer")]
#[command(about = "xfer: bounded-concurrency transfer queue with retry and cancellation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Copy files into a destination directory through the scheduler.
    Run {
        /// Source files; the file name is the task id.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Destination directory (created if missing).
        #[arg(long, value_name = "DIR")]
        dest: PathBuf,
        /// Give this source high priority (repeatable).
        #[arg(long = "high", value_name = "SOURCE")]
        high: Vec<PathBuf>,
        /// Sleep between chunks, to make long transfers observable.
        #[arg(long, default_value = "0", value_name = "N")]
        chunk_delay_ms: u64,
    },

    /// Stop admitting new transfers in the running `xfer run`.
    Pause,

    /// Resume admission in the running `xfer run`.
    Resume,

    /// Cancel one transfer by task id.
    Cancel {
        /// Task identifier (source file name).
        id: String,
    },

    /// Cancel every queued and active transfer.
    CancelAll,

    /// Report connectivity change.
    Network {
        #[arg(value_enum)]
        state: NetworkState,
    },

    /// Report app lifecycle change.
    Lifecycle {
        #[arg(value_enum)]
        state: LifecycleState,
    },

    /// Report memory pressure (reduces concurrency).
    MemoryWarning,

    /// Return to the configured concurrency after a memory warning.
    RestoreConcurrency,

    /// Set the configured concurrency cap of the running scheduler.
    SetMaxConcurrency { n: usize },

    /// Print the retry delay schedule.
    Backoff,

    /// Print the config path and effective values.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkState {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LifecycleState {
    Foreground,
    Background,
}

impl From<LifecycleState> for AppLifecycle {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Foreground => AppLifecycle::Foreground,
            LifecycleState::Background => AppLifecycle::Background,
        }
    }
}

impl CliCommand {
    /// The control-socket command this subcommand forwards, if it is a signal.
    pub fn control_command(&self) -> Option<ControlCommand> {
        let cmd = match self {
            CliCommand::Pause => ControlCommand::Pause,
            CliCommand::Resume => ControlCommand::Resume,
            CliCommand::Cancel { id } => ControlCommand::Cancel(id.as_str().into()),
            CliCommand::CancelAll => ControlCommand::CancelAll,
            CliCommand::Network { state } => ControlCommand::Signal(Signal::Network {
                online: *state == NetworkState::Online,
            }),
            CliCommand::Lifecycle { state } => {
                ControlCommand::Signal(Signal::Lifecycle((*state).into()))
            }
            CliCommand::MemoryWarning => ControlCommand::Signal(Signal::MemoryWarning),
            CliCommand::RestoreConcurrency => ControlCommand::Signal(Signal::RestoreConcurrency),
            CliCommand::SetMaxConcurrency { n } => {
                ControlCommand::Signal(Signal::SetMaxConcurrency(*n))
            }
            CliCommand::Run { .. } | CliCommand::Backoff | CliCommand::Config => return None,
        };
        Some(cmd)
    }

    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let Some(control) = cli.command.control_command() {
            return run_signal(&control).await;
        }

        match cli.command {
            CliCommand::Run {
                sources,
                dest,
                high,
                chunk_delay_ms,
            } => {
                let opts = RunOptions {
                    sources,
                    dest,
                    high,
                    chunk_delay_ms,
                };
                run_transfers(&cfg, opts).await?;
            }
            CliCommand::Backoff => run_backoff(&cfg),
            CliCommand::Config => run_show_config(&cfg)?,
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
