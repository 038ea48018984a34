//! Configuration module for Ripple-Queue
//!
//! Configuration is built once at startup, either from environment
//! variables (optionally via a `.env` file) or from a TOML file, validated,
//! and then passed by reference to the frontier, visited set, and supervisor.
//!
//! # Example
//!
//! ```no_run
//! use ripple_queue::config::from_env;
//!
//! let config = from_env().unwrap();
//! println!("Consuming from queue: {}", config.queue.name);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{Config, CrawlerConfig, QueueConfig, VisitedConfig, WireFormat};

pub use parser::{
    compute_config_hash, from_env, from_lookup, load_config, load_config_with_hash, resolve_config,
};
