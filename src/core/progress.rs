use std::sync::Mutex;
use tokio::sync::watch;
use tracing::warn;

const BAR_WIDTH: usize = 30;

/// Point-in-time view of copy progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub files_copied: u64,
    pub total_files: u64,
    pub percent: u8,
    pub status: String,
}

impl ProgressUpdate {
    pub(crate) fn new(files_copied: u64, total_files: u64) -> Self {
        // Nothing to copy counts as complete
        let percent = if total_files == 0 {
            100
        } else {
            (files_copied * 100 / total_files) as u8
        };

        Self {
            files_copied,
            total_files,
            percent,
            status: format_status(files_copied, total_files, percent),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.files_copied == self.total_files
    }
}

fn format_status(files_copied: u64, total_files: u64, percent: u8) -> String {
    if total_files == 0 {
        return "Nothing to copy.".to_string();
    }

    let filled = percent as usize * BAR_WIDTH / 100;
    format!(
        "Copying files... [{}{}] {}% ({}/{})",
        "=".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        percent,
        files_copied,
        total_files,
    )
}

/// Single serialization point for completed-file counts.
///
/// Shared by the orchestrator (streamed files) and the write worker
/// (batched files). Every update is published on a watch channel so display
/// loops can either await changes or poll the latest value.
pub struct ProgressTracker {
    files_copied: Mutex<u64>,
    total_files: u64,
    publisher: watch::Sender<ProgressUpdate>,
}

impl ProgressTracker {
    pub fn new(total_files: u64) -> Self {
        let (publisher, _) = watch::channel(ProgressUpdate::new(0, total_files));
        Self::with_publisher(total_files, publisher)
    }

    /// Publish on an existing channel, resetting it to `0/total_files`
    pub fn with_publisher(total_files: u64, publisher: watch::Sender<ProgressUpdate>) -> Self {
        publisher.send_replace(ProgressUpdate::new(0, total_files));

        Self {
            files_copied: Mutex::new(0),
            total_files,
            publisher,
        }
    }

    /// Record one completed file and publish the new status
    pub fn report_one(&self) -> ProgressUpdate {
        let mut files_copied = self.files_copied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if *files_copied >= self.total_files {
            warn!("Progress reported beyond total of {} files", self.total_files);
        } else {
            *files_copied += 1;
        }

        let update = ProgressUpdate::new(*files_copied, self.total_files);
        // Publish while still holding the lock so subscribers never see counts go backwards
        self.publisher.send_replace(update.clone());
        update
    }

    pub fn files_copied(&self) -> u64 {
        *self.files_copied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    /// Latest published status
    pub fn snapshot(&self) -> ProgressUpdate {
        self.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.publisher.subscribe()
    }
}
