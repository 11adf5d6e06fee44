//! Local file copy executor used by `xfer run`.
//!
//! Copies in chunks into `<dest>.part`, reports progress after each chunk,
//! checks the abort token between chunks and renames into place on success.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use xfer_core::control::AbortToken;
use xfer_core::error::TransferError;
use xfer_core::scheduler::{Executor, ProgressSink, TransferOutcome};

const CHUNK_SIZE: usize = 64 * 1024;

/// One file to copy.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct LocalCopyExecutor {
    chunk_delay: Duration,
}

impl LocalCopyExecutor {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }

    async fn copy(
        &self,
        job: &CopyJob,
        progress: &ProgressSink,
        abort: &AbortToken,
    ) -> Result<bool, TransferError> {
        let io = |e: std::io::Error| TransferError::from_io(&e);
        let mut src = fs::File::open(&job.source).await.map_err(io)?;
        let total = src.metadata().await.map_err(io)?.len();
        let part = part_path(&job.dest);
        let mut out = fs::File::create(&part).await.map_err(io)?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut done = 0u64;
        loop {
            if abort.is_aborted() {
                drop(out);
                let _ = fs::remove_file(&part).await;
                return Ok(false);
            }
            let n = src.read(&mut buf).await.map_err(io)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await.map_err(io)?;
            done += n as u64;
            progress.report_fraction(done, total);

            if !self.chunk_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                    _ = abort.aborted() => {}
                }
            }
        }
        out.flush().await.map_err(io)?;
        drop(out);
        fs::rename(&part, &job.dest).await.map_err(io)?;
        Ok(true)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl Executor<CopyJob> for LocalCopyExecutor {
    async fn execute(
        &self,
        payload: Arc<CopyJob>,
        progress: ProgressSink,
        abort: AbortToken,
    ) -> TransferOutcome {
        tracing::debug!(
            id = %progress.task_id(),
            source = %payload.source.display(),
            dest = %payload.dest.display(),
            "copy starting"
        );
        match self.copy(&payload, &progress, &abort).await {
            Ok(true) => TransferOutcome::Succeeded(Some(payload.dest.display().to_string())),
            Ok(false) => TransferOutcome::Aborted,
            Err(e) => {
                let _ = fs::remove_file(part_path(&payload.dest)).await;
                TransferOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_core::config::XferConfig;
    use xfer_core::registry::{TaskInput, TaskState};
    use xfer_core::scheduler::Scheduler;

    fn spawn(chunk_delay: Duration) -> Scheduler<CopyJob> {
        Scheduler::spawn(&XferConfig::default(), LocalCopyExecutor::new(chunk_delay))
    }

    #[tokio::test]
    async fn copies_file_and_reports_full_progress() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.bin");
        let body: Vec<u8> = (0u8..=255).cycle().take(200 * 1024).collect();
        std::fs::write(&source, &body).unwrap();
        let dest = dir.path().join("dst.bin");

        let scheduler = spawn(Duration::ZERO);
        let job = CopyJob {
            source,
            dest: dest.clone(),
        };
        scheduler.enqueue(TaskInput::new("src.bin", job)).await.unwrap();
        scheduler.start().await.unwrap();
        let mut rx = scheduler.subscribe_stats();
        rx.wait_for(|s| s.is_drained()).await.unwrap();

        let task = scheduler.task("src.bin").await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.progress, 100);
        assert_eq!(task.receipt, Some(dest.display().to_string()));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn missing_source_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = spawn(Duration::ZERO);
        let job = CopyJob {
            source: dir.path().join("nope.bin"),
            dest: dir.path().join("out.bin"),
        };
        scheduler.enqueue(TaskInput::new("nope.bin", job)).await.unwrap();
        scheduler.start().await.unwrap();
        let mut rx = scheduler.subscribe_stats();
        rx.wait_for(|s| s.failed_uploads == 1).await.unwrap();

        let task = scheduler.task("nope.bin").await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempt, 1);
    }

    #[tokio::test]
    async fn cancel_stops_a_slow_copy_and_removes_the_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.bin");
        std::fs::write(&source, vec![7u8; 10 * CHUNK_SIZE]).unwrap();
        let dest = dir.path().join("big.out");

        let scheduler = spawn(Duration::from_secs(60));
        let job = CopyJob {
            source,
            dest: dest.clone(),
        };
        scheduler.enqueue(TaskInput::new("big.bin", job)).await.unwrap();
        scheduler.start().await.unwrap();
        scheduler.cancel("big.bin").await.unwrap();

        let task = scheduler.task("big.bin").await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/a.bin")),
            PathBuf::from("/tmp/a.bin.part")
        );
    }
}
