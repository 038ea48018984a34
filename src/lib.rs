//! Ripple-Queue: a queue-backed distributed web crawler
//!
//! Producers seed a durable work queue (the frontier) with URLs. Consumers pull
//! URLs, fetch the page, extract same-origin links, and publish the newly
//! discovered links back to the same queue. A shared visited set makes every
//! URL crawl at most once, even under redelivery.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod logging;
pub mod state;
pub mod url;
pub mod visited;

use thiserror::Error;

/// Errors that stop a crawl worker
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("Visited set error: {0}")]
    Visited(#[from] visited::VisitedError),

    #[error("Worker {worker} panicked or was aborted: {message}")]
    WorkerJoin { worker: usize, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Ripple-Queue operations
pub type Result<T> = std::result::Result<T, RippleError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlWorker, Supervisor};
pub use frontier::{CrawlTask, Frontier};
pub use state::VisitState;
pub use crate::url::{normalize_url, same_origin};
pub use visited::VisitedSet;
