use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files larger than this are streamed; batches seal once they reach it
pub const DEFAULT_BATCH_THRESHOLD: u64 = 100 * 1024 * 1024;
/// Maximum number of sealed batches waiting for the writer
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;
/// Read/write chunk used when streaming large files
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_LOG_LEVEL: &str = "info";

#[inline]
fn default_batch_threshold() -> u64 {
    DEFAULT_BATCH_THRESHOLD
}

#[inline]
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[inline]
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[inline]
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Rejected configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch threshold must be greater than zero")]
    ZeroThreshold,
    #[error("queue capacity must be at least one batch")]
    ZeroCapacity,
    #[error("copy chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// Copy pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Size boundary in bytes between batched and streamed files,
    /// also the cumulative size at which a batch is sealed
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: u64,

    /// Number of sealed batches allowed in flight
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Buffer size for streaming large files
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file directory (if None, only console logging)
    #[serde(default)]
    pub log_directory: Option<PathBuf>,

    /// Log file rotation strategy
    #[serde(default)]
    pub log_rotation: LogRotation,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_level: default_log_level(),
            log_directory: None,
            log_rotation: LogRotation::default(),
        }
    }
}

impl CopyConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: CopyConfig = serde_json::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }

    /// Upper bound on bytes held by queued batches
    pub fn max_resident_bytes(&self) -> u64 {
        self.batch_threshold.saturating_mul(self.queue_capacity as u64)
    }
}

/// Log file rotation strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate daily
    #[default]
    Daily,
    /// Rotate hourly
    Hourly,
    /// Never rotate (single file)
    Never,
}
