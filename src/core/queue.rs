use thiserror::Error;
use tokio::sync::mpsc;

use super::batch::Batch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("write queue is closed")]
    Closed,
    #[error("write queue was already closed")]
    AlreadyClosed,
}

/// Create a bounded write queue holding at most `capacity` sealed batches.
///
/// Panics if `capacity` is zero; `CopyConfig::validate` rejects that value
/// before a queue is ever built.
pub fn write_queue(capacity: usize) -> (WriteQueue, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (WriteQueue { tx: Some(tx) }, BatchReceiver { rx })
}

/// Producer side of the bounded write queue
#[derive(Debug)]
pub struct WriteQueue {
    tx: Option<mpsc::Sender<Batch>>,
}

impl WriteQueue {
    /// Hand a sealed batch to the writer, waiting while the queue is full
    pub async fn enqueue(&self, batch: Batch) -> Result<(), QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        // Send only fails when the receiver is gone, i.e. the writer stopped
        tx.send(batch).await.map_err(|_| QueueError::Closed)
    }

    /// Signal that no further batches will arrive
    pub fn close(&mut self) -> Result<(), QueueError> {
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(QueueError::AlreadyClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Batches currently waiting for the writer
    pub fn pending(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }
}

/// Consumer side of the bounded write queue
#[derive(Debug)]
pub struct BatchReceiver {
    rx: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    /// Next batch in enqueue order, or `None` once closed and drained
    pub async fn next_batch(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }
}
