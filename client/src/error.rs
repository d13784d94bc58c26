//! Unified error handling for the client.

use crate::config::ConfigError;
use basket_engine::{CacheError, SyncError};

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, AppError>;
