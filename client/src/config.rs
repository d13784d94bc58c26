//! Configuration management for the client.

use basket_engine::EngineConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote collection service
    pub api_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Directory holding the durable cache files
    pub cache_dir: PathBuf,
    /// Per-request timeout
    pub timeout: Duration,
    /// Items requested per page when refreshing
    pub page_size: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("BASKET_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let auth_token = lookup("BASKET_AUTH_TOKEN").filter(|token| !token.is_empty());

        let cache_dir = lookup("BASKET_CACHE_DIR")
            .unwrap_or_else(|| ".basket-cache".to_string())
            .into();

        let timeout = lookup("BASKET_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidTimeout)?;

        let page_size = lookup("BASKET_PAGE_SIZE")
            .unwrap_or_else(|| "100".to_string())
            .parse::<u32>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ConfigError::InvalidPageSize)?;

        Ok(Self {
            api_url,
            auth_token,
            cache_dir,
            timeout,
            page_size,
        })
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            page_size: self.page_size,
            ..EngineConfig::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BASKET_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid BASKET_TIMEOUT_SECS value")]
    InvalidTimeout,

    #[error("Invalid BASKET_PAGE_SIZE value")]
    InvalidPageSize,
}
