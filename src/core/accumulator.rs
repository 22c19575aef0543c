use std::path::PathBuf;
use tracing::debug;

use super::batch::Batch;
use super::queue::{QueueError, WriteQueue};

/// Collects small files into batches and hands sealed batches to the writer
pub struct SmallFileAccumulator {
    current: Batch,
    threshold: u64,
    queue: WriteQueue,
    batches_sealed: u64,
}

impl SmallFileAccumulator {
    pub fn new(threshold: u64, queue: WriteQueue) -> Self {
        Self {
            current: Batch::new(),
            threshold,
            queue,
            batches_sealed: 0,
        }
    }

    /// Append a file; seals and enqueues the batch once it reaches the threshold
    pub async fn add(&mut self, relative_path: PathBuf, data: Vec<u8>) -> Result<(), QueueError> {
        self.current.push(relative_path, data);

        if self.current.size() >= self.threshold {
            self.seal().await?;
        }

        Ok(())
    }

    /// Enqueue any remaining files and close the queue
    pub async fn flush(&mut self) -> Result<(), QueueError> {
        if !self.current.is_empty() {
            self.seal().await?;
        }

        self.queue.close()
    }

    async fn seal(&mut self) -> Result<(), QueueError> {
        // A closed queue drops these records along with the error; the copy is failing by then
        let sealed = std::mem::take(&mut self.current);
        debug!("Sealed batch of {} files ({} bytes)", sealed.len(), sealed.size());

        self.queue.enqueue(sealed).await?;
        self.batches_sealed += 1;
        Ok(())
    }

    pub fn batches_sealed(&self) -> u64 {
        self.batches_sealed
    }

    /// Bytes held by the batch still being filled
    pub fn pending_bytes(&self) -> u64 {
        self.current.size()
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }
}
