//! `xfer run` – copy files through the scheduler until every task is finished.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use xfer_core::config::XferConfig;
use xfer_core::error::SchedulerError;
use xfer_core::observe::SchedulerEvent;
use xfer_core::registry::{TaskInput, TaskState};
use xfer_core::scheduler::Scheduler;

use crate::cli::control_socket;
use crate::cli::copy_executor::{CopyJob, LocalCopyExecutor};

/// Arguments of `xfer run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub sources: Vec<PathBuf>,
    pub dest: PathBuf,
    pub high: Vec<PathBuf>,
    pub chunk_delay_ms: u64,
}

/// Builds one task per source; the file name is the task id.
fn build_inputs(opts: &RunOptions) -> Result<Vec<TaskInput<CopyJob>>> {
    opts.sources
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .with_context(|| format!("{} has no file name", source.display()))?
                .to_string_lossy()
                .into_owned();
            let job = CopyJob {
                source: source.clone(),
                dest: opts.dest.join(&name),
            };
            let input = TaskInput::new(name, job);
            Ok(if opts.high.contains(source) {
                input.high_priority()
            } else {
                input
            })
        })
        .collect()
}

pub async fn run_transfers(cfg: &XferConfig, opts: RunOptions) -> Result<()> {
    tokio::fs::create_dir_all(&opts.dest)
        .await
        .with_context(|| format!("create {}", opts.dest.display()))?;
    let inputs = build_inputs(&opts)?;

    let executor = LocalCopyExecutor::new(Duration::from_millis(opts.chunk_delay_ms));
    let scheduler = Scheduler::spawn(cfg, executor);

    let mut accepted = 0usize;
    for input in inputs {
        match scheduler.enqueue(input).await {
            Ok(_) => accepted += 1,
            Err(SchedulerError::Duplicate(id)) => println!("Skipping duplicate task {id}"),
            Err(e) => return Err(e.into()),
        }
    }
    if accepted == 0 {
        println!("Nothing to transfer.");
        return Ok(());
    }

    let socket_path = xfer_core::control::default_control_socket_path().ok();
    let listener = match &socket_path {
        Some(path) => match control_socket::spawn_control_listener(scheduler.clone(), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    let printer = tokio::spawn(print_events(scheduler.subscribe()));

    scheduler.start().await?;
    let mut stats_rx = scheduler.subscribe_stats();
    stats_rx
        .wait_for(|s| s.is_drained())
        .await
        .context("scheduler stopped unexpectedly")?;

    let tasks = scheduler.tasks().await?;
    let stats = scheduler.stats();
    scheduler.shutdown().await?;
    printer.abort();
    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = socket_path {
        let _ = std::fs::remove_file(path);
    }

    println!();
    for task in &tasks {
        match (&task.state, &task.error) {
            (TaskState::Failed, Some(err)) => {
                println!("  {:<30} failed after {} attempt(s): {err}", task.id.as_str(), task.attempt)
            }
            (state, _) => println!("  {:<30} {state:?}", task.id.as_str()),
        }
    }
    println!(
        "{}/{} finished: {} completed, {} failed, {} cancelled",
        stats.finished(),
        stats.total_uploads,
        stats.completed_uploads,
        stats.failed_uploads,
        stats.cancelled_uploads
    );
    tracing::info!(
        completed = stats.completed_uploads,
        failed = stats.failed_uploads,
        cancelled = stats.cancelled_uploads,
        "run finished"
    );

    if stats.failed_uploads > 0 {
        bail!("{} transfer(s) failed", stats.failed_uploads);
    }
    Ok(())
}

/// Prints lifecycle events; progress only every 10%.
async fn print_events(mut events: tokio::sync::broadcast::Receiver<SchedulerEvent>) {
    let mut last_decile: HashMap<String, u8> = HashMap::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            SchedulerEvent::Admitted { id, attempt } => {
                last_decile.remove(id.as_str());
                if attempt > 1 {
                    println!("→ {id} (attempt {attempt})");
                } else {
                    println!("→ {id}");
                }
            }
            SchedulerEvent::Progress { id, percent } => {
                let decile = percent / 10;
                let last = last_decile.entry(id.as_str().to_string()).or_insert(0);
                if decile > *last {
                    *last = decile;
                    println!("  {id} {percent}%");
                }
            }
            SchedulerEvent::Succeeded { id } => println!("✓ {id}"),
            SchedulerEvent::RetryScheduled { id, attempt, delay } => {
                println!("↻ {id} attempt {attempt} failed, retrying in {delay:?}")
            }
            SchedulerEvent::Failed { id, error } => println!("✗ {id}: {error}"),
            SchedulerEvent::Cancelled { id } => println!("⊘ {id} cancelled"),
        }
    }
}
