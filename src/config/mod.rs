pub mod models;

pub use models::{ConfigError, CopyConfig, LogRotation};
