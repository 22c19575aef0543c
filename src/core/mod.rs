pub mod accumulator;
pub mod batch;
pub mod discovery;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod streamer;
pub mod writer;

pub use accumulator::SmallFileAccumulator;
pub use batch::{Batch, FileRecord};
pub use discovery::{discover, DiscoveredFile, Discovery};
pub use orchestrator::{CopyOrchestrator, CopyPhase, CopyReport};
pub use progress::{ProgressTracker, ProgressUpdate};
pub use queue::{write_queue, BatchReceiver, QueueError, WriteQueue};
pub use streamer::LargeFileStreamer;
pub use writer::{WriteSummary, WriteWorker};
