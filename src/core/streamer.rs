use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::progress::ProgressTracker;

/// Copies oversized files straight to the destination through a fixed buffer
pub struct LargeFileStreamer {
    chunk_size: usize,
    progress: Arc<ProgressTracker>,
}

impl LargeFileStreamer {
    pub fn new(chunk_size: usize, progress: Arc<ProgressTracker>) -> Self {
        Self { chunk_size, progress }
    }

    /// Stream `source` into `target`, returning the number of bytes written.
    ///
    /// A failure part way through leaves the partially written target in place.
    pub async fn copy(&self, source: &Path, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut reader = tokio::fs::File::open(source).await
            .with_context(|| format!("Failed to open source file {}", source.display()))?;
        let mut writer = tokio::fs::File::create(target).await
            .with_context(|| format!("Failed to create target file {}", target.display()))?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes_copied = 0u64;

        loop {
            let read = reader.read(&mut buffer).await
                .with_context(|| format!("Failed to read {}", source.display()))?;
            if read == 0 {
                break;
            }

            writer.write_all(&buffer[..read]).await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            bytes_copied += read as u64;
        }

        writer.flush().await
            .with_context(|| format!("Failed to flush {}", target.display()))?;

        debug!("Streamed {} ({} bytes)", source.display(), bytes_copied);
        self.progress.report_one();

        Ok(bytes_copied)
    }
}
