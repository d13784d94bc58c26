//! # Basket Client
//!
//! Adapters that connect the basket engine to the outside world:
//!
//! - [`HttpCollectionService`] - the remote collection service over HTTP
//! - [`FileCache`] - a durable cache of one JSON file per key
//! - [`Config`] - environment configuration shared by both

pub mod config;
pub mod error;
pub mod file_cache;
pub mod http;

pub use config::{Config, ConfigError};
pub use error::{AppError, Result};
pub use file_cache::FileCache;
pub use http::HttpCollectionService;
