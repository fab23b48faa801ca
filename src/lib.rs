//! IdeaHub request middleware
//!
//! Rate limiting, caching, logging and monitoring around every API call,
//! plus a throttled diagnostics server exposing that state.

pub mod core;
pub mod infrastructure;
pub mod middleware;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use infrastructure::config::{Config, ConfigError};
pub use middleware::{ApiCallOptions, ApiMiddleware, RateLimited, Services};

use thiserror::Error;

/// Main error type for the middleware crate
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
