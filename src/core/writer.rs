use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::batch::Batch;
use super::progress::ProgressTracker;
use super::queue::BatchReceiver;

/// Totals produced by a write worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub batches_written: u64,
    pub files_written: u64,
    pub bytes_written: u64,
}

/// The single consumer of the write queue.
///
/// Only one worker exists per copy operation so destination writes stay in
/// enqueue order and directory creation never races.
pub struct WriteWorker {
    destination_root: PathBuf,
    progress: Arc<ProgressTracker>,
}

impl WriteWorker {
    pub fn new(destination_root: PathBuf, progress: Arc<ProgressTracker>) -> Self {
        Self { destination_root, progress }
    }

    /// Start draining `batches` on a background task
    pub fn spawn(self, batches: BatchReceiver) -> JoinHandle<Result<WriteSummary>> {
        tokio::spawn(self.run(batches))
    }

    /// Write every batch until the queue is closed and empty.
    ///
    /// The first I/O error ends the run; dropping the receiver then makes
    /// any blocked producer fail instead of waiting forever.
    pub async fn run(self, mut batches: BatchReceiver) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();

        while let Some(batch) = batches.next_batch().await {
            self.write_batch(batch, &mut summary).await?;
            summary.batches_written += 1;
        }

        debug!(
            "Write worker finished: {} batches, {} files",
            summary.batches_written, summary.files_written
        );
        Ok(summary)
    }

    async fn write_batch(&self, batch: Batch, summary: &mut WriteSummary) -> Result<()> {
        debug!("Writing batch of {} files ({} bytes)", batch.len(), batch.size());

        for record in batch.into_records() {
            let target = self.destination_root.join(&record.relative_path);

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }

            tokio::fs::write(&target, &record.data).await
                .with_context(|| format!("Failed to write {}", target.display()))?;

            summary.files_written += 1;
            summary.bytes_written += record.data.len() as u64;
            self.progress.report_one();
        }

        Ok(())
    }
}
