use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::CopyConfig;

use super::accumulator::SmallFileAccumulator;
use super::discovery::{discover, Discovery};
use super::progress::{ProgressTracker, ProgressUpdate};
use super::queue::{write_queue, QueueError};
use super::streamer::LargeFileStreamer;
use super::writer::{WriteSummary, WriteWorker};

/// Lifecycle of a single copy operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyPhase {
    Idle,
    Discovering,
    Copying,
    Flushing,
    Done,
    Failed,
}

/// Outcome of a successful copy
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub total_files: u64,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub files_streamed: u64,
    pub files_batched: u64,
    pub batches_written: u64,
    /// Requested sources that were skipped because they no longer existed
    pub missing_sources: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ProducerStats {
    files_streamed: u64,
    bytes_streamed: u64,
    files_batched: u64,
}

/// Drives discovery, routes each file to the streamer or the batch
/// pipeline, and owns the write worker for the duration of a copy.
pub struct CopyOrchestrator {
    config: CopyConfig,
    destination: PathBuf,
    phase: CopyPhase,
    publisher: watch::Sender<ProgressUpdate>,
    progress: Option<Arc<ProgressTracker>>,
}

impl CopyOrchestrator {
    pub fn new(config: CopyConfig, destination: impl Into<PathBuf>) -> Result<Self> {
        config.validate().context("Invalid copy configuration")?;

        let (publisher, _) = watch::channel(ProgressUpdate::new(0, 0));

        Ok(Self {
            config,
            destination: destination.into(),
            phase: CopyPhase::Idle,
            publisher,
            progress: None,
        })
    }

    pub fn phase(&self) -> CopyPhase {
        self.phase
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Progress updates for this orchestrator, valid across the whole run
    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.publisher.subscribe()
    }

    /// Files completed so far in the current or last run
    pub fn files_copied(&self) -> u64 {
        self.progress.as_ref().map_or(0, |p| p.files_copied())
    }

    /// Copy `sources` into the destination directory
    pub async fn run(&mut self, sources: &[PathBuf]) -> Result<CopyReport> {
        let started_at = Utc::now();
        let timer = Instant::now();

        info!(
            "Copying {} sources to {} (threshold {} bytes, {} batches in flight)",
            sources.len(),
            self.destination.display(),
            self.config.batch_threshold,
            self.config.queue_capacity
        );

        self.phase = CopyPhase::Discovering;
        let discovery = match discover(sources).await {
            Ok(d) => d,
            Err(e) => {
                self.phase = CopyPhase::Failed;
                error!("Discovery failed: {:#}", e);
                return Err(e.context("Failed to enumerate source files"));
            }
        };

        let total = discovery.total_files();
        info!("Found {} files ({} bytes)", total, discovery.total_bytes());

        let progress = Arc::new(ProgressTracker::with_publisher(total, self.publisher.clone()));
        self.progress = Some(progress.clone());

        let (stats, summary) = match self.copy_all(&discovery, progress.clone()).await {
            Ok(result) => result,
            Err(e) => {
                self.phase = CopyPhase::Failed;
                let copied = progress.files_copied();
                error!("Copy failed after {}/{} files: {:#}", copied, total, e);
                return Err(e.context(format!("Copy failed after {}/{} files", copied, total)));
            }
        };

        if progress.files_copied() != total {
            self.phase = CopyPhase::Failed;
            bail!(
                "Copy finished with {}/{} files accounted for",
                progress.files_copied(),
                total
            );
        }

        self.phase = CopyPhase::Done;

        let report = CopyReport {
            total_files: total,
            files_copied: progress.files_copied(),
            bytes_copied: stats.bytes_streamed + summary.bytes_written,
            files_streamed: stats.files_streamed,
            files_batched: stats.files_batched,
            batches_written: summary.batches_written,
            missing_sources: discovery.missing,
            started_at,
            completed_at: Utc::now(),
            elapsed: timer.elapsed(),
        };

        info!(
            "Copy complete: {} files, {} bytes in {:.2?}",
            report.files_copied, report.bytes_copied, report.elapsed
        );

        Ok(report)
    }

    async fn copy_all(
        &mut self,
        discovery: &Discovery,
        progress: Arc<ProgressTracker>,
    ) -> Result<(ProducerStats, WriteSummary)> {
        tokio::fs::create_dir_all(&self.destination).await
            .with_context(|| format!("Failed to create destination {}", self.destination.display()))?;

        let (queue, batches) = write_queue(self.config.queue_capacity);
        let writer = WriteWorker::new(self.destination.clone(), progress.clone()).spawn(batches);

        let mut accumulator = SmallFileAccumulator::new(self.config.batch_threshold, queue);
        let streamer = LargeFileStreamer::new(self.config.chunk_size, progress);

        self.phase = CopyPhase::Copying;
        let produced = match self.produce(discovery, &mut accumulator, &streamer).await {
            Ok(stats) => {
                self.phase = CopyPhase::Flushing;
                accumulator.flush().await.map(|_| stats).map_err(anyhow::Error::from)
            }
            Err(e) => Err(e),
        };
        debug!("{} batches sealed", accumulator.batches_sealed());
        // Releases the sender so the writer can finish
        drop(accumulator);

        match produced {
            Ok(stats) => {
                let summary = writer.await.context("Write worker terminated abnormally")??;
                Ok((stats, summary))
            }
            // The writer closed the queue; its own error is the real cause
            Err(e) if e.is::<QueueError>() => match writer.await {
                Ok(Err(write_error)) => Err(write_error),
                _ => Err(e),
            },
            Err(e) => {
                writer.abort();
                let _ = writer.await;
                Err(e)
            }
        }
    }

    async fn produce(
        &self,
        discovery: &Discovery,
        accumulator: &mut SmallFileAccumulator,
        streamer: &LargeFileStreamer,
    ) -> Result<ProducerStats> {
        let mut stats = ProducerStats::default();

        for file in &discovery.files {
            if file.size > self.config.batch_threshold {
                let target = self.destination.join(&file.relative_path);
                stats.bytes_streamed += streamer.copy(&file.source, &target).await?;
                stats.files_streamed += 1;
            } else {
                let data = tokio::fs::read(&file.source).await
                    .with_context(|| format!("Failed to read {}", file.source.display()))?;
                accumulator.add(file.relative_path.clone(), data).await?;
                stats.files_batched += 1;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn config(threshold: u64) -> CopyConfig {
        CopyConfig {
            batch_threshold: threshold,
            queue_capacity: 2,
            chunk_size: 16,
            ..CopyConfig::default()
        }
    }

    async fn write(path: &Path, data: &[u8]) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, data).await.unwrap();
    }

    fn workspace() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        (dir, source, target)
    }

    #[tokio::test]
    async fn test_small_file_is_batched() {
        let (_dir, source, target) = workspace();
        let file = source.join("note.txt");
        write(&file, b"0123456789").await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let rx = orchestrator.subscribe();
        let report = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(orchestrator.phase(), CopyPhase::Done);
        assert_eq!(report.files_batched, 1);
        assert_eq!(report.files_streamed, 0);
        assert_eq!(report.batches_written, 1);
        assert_eq!(tokio::fs::read(target.join("note.txt")).await.unwrap(), b"0123456789");

        let last = rx.borrow().clone();
        assert_eq!((last.files_copied, last.total_files), (1, 1));
        assert!(last.status.ends_with("100% (1/1)"));
    }

    #[tokio::test]
    async fn test_large_file_is_streamed() {
        let (_dir, source, target) = workspace();
        let file = source.join("blob.bin");
        let payload: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        write(&file, &payload).await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let report = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(report.files_streamed, 1);
        assert_eq!(report.files_batched, 0);
        assert_eq!(report.batches_written, 0);
        assert_eq!(report.bytes_copied, 200);
        assert_eq!(tokio::fs::read(target.join("blob.bin")).await.unwrap(), payload);
        assert_eq!(orchestrator.files_copied(), 1);
    }

    #[tokio::test]
    async fn test_batches_seal_and_final_flush() {
        let (_dir, source, target) = workspace();
        let mut files = vec![];
        for i in 0..5 {
            let file = source.join(format!("part{}.dat", i));
            write(&file, &[b'a' + i as u8; 30]).await;
            files.push(file);
        }

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let report = orchestrator.run(&files).await.unwrap();

        // Four files reach 120 bytes and seal, the fifth is flushed at the end
        assert_eq!(report.batches_written, 2);
        assert_eq!(report.files_batched, 5);
        assert_eq!(report.files_copied, 5);
        assert_eq!(report.bytes_copied, 150);
        for i in 0..5 {
            let data = tokio::fs::read(target.join(format!("part{}.dat", i))).await.unwrap();
            assert_eq!(data, vec![b'a' + i as u8; 30]);
        }
        assert_eq!(orchestrator.subscribe().borrow().files_copied, 5);
    }

    #[tokio::test]
    async fn test_nested_directory_structure_is_reproduced() {
        let (_dir, source, target) = workspace();
        let album = source.join("album");
        write(&album.join("cover.png"), &[1u8; 40]).await;
        write(&album.join("disc1").join("track01.flac"), &[2u8; 150]).await;
        write(&album.join("disc1").join("notes").join("liner.txt"), b"liner").await;
        write(&album.join("disc2").join("track01.flac"), &[3u8; 90]).await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let report = orchestrator.run(&[album]).await.unwrap();

        assert_eq!(report.total_files, 4);
        assert_eq!(report.files_streamed, 1);
        assert_eq!(report.files_batched, 3);
        assert_eq!(tokio::fs::read(target.join("album/cover.png")).await.unwrap(), vec![1u8; 40]);
        assert_eq!(tokio::fs::read(target.join("album/disc1/track01.flac")).await.unwrap(), vec![2u8; 150]);
        assert_eq!(tokio::fs::read(target.join("album/disc1/notes/liner.txt")).await.unwrap(), b"liner");
        assert_eq!(tokio::fs::read(target.join("album/disc2/track01.flac")).await.unwrap(), vec![3u8; 90]);
        assert!(!target.join("source").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_reported_not_fatal() {
        let (_dir, source, target) = workspace();
        let present = source.join("present.txt");
        let missing = source.join("vanished.txt");
        write(&present, b"here").await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let report = orchestrator.run(&[missing.clone(), present]).await.unwrap();

        assert_eq!(report.total_files, 1);
        assert_eq!(report.missing_sources, vec![missing]);
        assert!(target.join("present.txt").exists());
    }

    #[tokio::test]
    async fn test_nothing_to_copy_completes() {
        let (_dir, source, target) = workspace();
        tokio::fs::create_dir_all(source.join("empty")).await.unwrap();

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let report = orchestrator.run(&[source.join("empty")]).await.unwrap();

        assert_eq!(orchestrator.phase(), CopyPhase::Done);
        assert_eq!(report.total_files, 0);
        assert_eq!(report.batches_written, 0);
        assert!(target.is_dir());
        assert_eq!(orchestrator.subscribe().borrow().percent, 100);
    }

    #[tokio::test]
    async fn test_many_batches_through_small_queue() {
        let (_dir, source, target) = workspace();
        let root = source.join("many");
        for i in 0..40 {
            write(&root.join(format!("d{}", i % 4)).join(format!("f{:02}.txt", i)), &[i as u8; 25]).await;
        }

        let cfg = CopyConfig { queue_capacity: 1, ..config(50) };
        let mut orchestrator = CopyOrchestrator::new(cfg, &target).unwrap();
        let mut rx = orchestrator.subscribe();

        let observer = tokio::spawn(async move {
            let mut last = 0;
            while rx.changed().await.is_ok() {
                let update = rx.borrow_and_update().clone();
                assert!(update.files_copied >= last);
                assert!(update.files_copied <= update.total_files);
                last = update.files_copied;
            }
            last
        });

        let report = orchestrator.run(&[root]).await.unwrap();
        assert_eq!(report.files_copied, 40);
        assert_eq!(report.batches_written, 20);

        drop(orchestrator);
        assert_eq!(observer.await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_write_failure_fails_operation() {
        let (_dir, source, target) = workspace();
        let dir = source.join("docs");
        write(&dir.join("a.txt"), b"aaaa").await;
        write(&dir.join("b.txt"), b"bbbb").await;

        // A file squatting on the directory the writer needs
        write(&target.join("docs"), b"not a directory").await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let err = orchestrator.run(&[dir]).await.unwrap_err();

        assert_eq!(orchestrator.phase(), CopyPhase::Failed);
        let message = format!("{:#}", err);
        assert!(message.contains("Copy failed after 0/2 files"), "unexpected error: {}", message);
        assert!(message.contains("docs"), "unexpected error: {}", message);
    }

    #[tokio::test]
    async fn test_stream_failure_fails_operation() {
        let (_dir, source, target) = workspace();
        let big = source.join("big.bin");
        write(&big, &[9u8; 300]).await;
        write(&target.join("big.bin").join("occupied"), b"").await;

        let mut orchestrator = CopyOrchestrator::new(config(100), &target).unwrap();
        let err = orchestrator.run(&[big]).await.unwrap_err();

        assert_eq!(orchestrator.phase(), CopyPhase::Failed);
        assert!(format!("{:#}", err).contains("big.bin"));
        assert_eq!(orchestrator.files_copied(), 0);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let result = CopyOrchestrator::new(config(0), "/tmp/unused");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_writer_error_wins_over_closed_queue() {
        let (_dir, source, target) = workspace();
        let docs = source.join("docs");
        for i in 0..30 {
            write(&docs.join(format!("f{:02}.txt", i)), &[b'd'; 20]).await;
        }
        write(&target.join("docs"), b"not a directory").await;

        // Every file seals its own batch and the single slot fills at once
        let cfg = CopyConfig { queue_capacity: 1, ..config(20) };
        let mut orchestrator = CopyOrchestrator::new(cfg, &target).unwrap();
        let err = orchestrator.run(&[docs]).await.unwrap_err();

        let message = format!("{:#}", err);
        assert_eq!(orchestrator.phase(), CopyPhase::Failed);
        assert!(message.contains("Failed to create directory"), "unexpected error: {}", message);
        assert!(message.contains("docs"), "unexpected error: {}", message);
        assert!(!message.contains("write queue is closed"), "unexpected error: {}", message);
        assert!(message.contains("Copy failed after 0/30 files"), "unexpected error: {}", message);
    }
}
