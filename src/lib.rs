pub mod core;
pub mod config;
pub mod observability;

pub use anyhow::{Context, Result};
