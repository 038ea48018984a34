//! Visited set: the deduplication oracle for crawled URLs
//!
//! `try_claim` is the single serialization point between workers. It
//! atomically records a `Pending` claim and returns true only to the first
//! caller for a URL, no matter how many workers (or processes, for the
//! SQLite backend) race on it. A claim then ends in exactly one of:
//!
//! - `mark_done` / `mark_failed`: terminal, the URL is never crawled again
//! - `release`: a transient failure, charged as one attempt; the URL may be
//!   claimed again when its task is redelivered
//! - `unclaim`: given back without charge (shutdown interrupted the fetch)
//!
//! ```text
//!            try_claim                mark_done
//!   (none) ─────────────► Pending ─────────────────► Done
//!                          │  ▲  ╲   mark_failed
//!           release/unclaim│  │   ╲────────────────► Failed
//!                          ▼  │ try_claim
//!                        Released
//! ```

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryVisitedSet;
pub use sqlite::SqliteVisitedSet;

use crate::config::VisitedConfig;
use crate::state::{VisitState, VisitedRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during visited-set operations
#[derive(Debug, Error)]
pub enum VisitedError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid state transition for {url}: {from:?} -> {to}")]
    InvalidTransition {
        url: String,
        from: Option<VisitState>,
        to: VisitState,
    },

    #[error("Corrupt visited record for {url}: {message}")]
    Corrupt { url: String, message: String },
}

/// Result type for visited-set operations
pub type VisitedResult<T> = Result<T, VisitedError>;

/// Concurrency-safe record of which URLs have been claimed for crawling
#[async_trait]
pub trait VisitedSet: Send + Sync {
    /// Atomically claims a URL; true iff no other claim is live or final
    async fn try_claim(&self, url: &Url) -> VisitedResult<bool>;

    /// Marks a claimed URL as successfully crawled
    async fn mark_done(&self, url: &Url) -> VisitedResult<()>;

    /// Marks a claimed URL as permanently failed
    async fn mark_failed(&self, url: &Url) -> VisitedResult<()>;

    /// Gives back a claim after a transient failure, charging one attempt
    ///
    /// Returns the total number of attempts charged to the URL so far.
    async fn release(&self, url: &Url) -> VisitedResult<u32>;

    /// Gives back a claim without charging an attempt
    async fn unclaim(&self, url: &Url) -> VisitedResult<()>;

    /// Forgets a URL entirely so it can be crawled again
    ///
    /// Returns true if a record existed.
    async fn reset(&self, url: &Url) -> VisitedResult<bool>;

    /// Looks up the record for a URL
    async fn get(&self, url: &Url) -> VisitedResult<Option<VisitedRecord>>;

    /// Counts records in a given state
    async fn count_by_state(&self, state: VisitState) -> VisitedResult<u64>;
}

/// Opens the visited set described by the configuration
///
/// A configured database path selects the SQLite backend, which every
/// consumer process on the host can share; otherwise claims are held in
/// memory and only deduplicate within this process.
pub fn open_visited_set(config: &VisitedConfig) -> VisitedResult<Arc<dyn VisitedSet>> {
    let ttl = config.claim_ttl();
    match &config.database_path {
        Some(path) => {
            tracing::info!("Using SQLite visited set at {}", path);
            Ok(Arc::new(SqliteVisitedSet::open(Path::new(path), ttl)?))
        }
        None => {
            tracing::info!("Using in-memory visited set");
            Ok(Arc::new(MemoryVisitedSet::with_claim_ttl(ttl)))
        }
    }
}

/// Returns true if a pending claim taken at `claimed_at` has outlived `ttl`
pub(crate) fn claim_expired(claimed_at: DateTime<Utc>, ttl: Option<Duration>) -> bool {
    match ttl {
        Some(ttl) => (Utc::now() - claimed_at)
            .to_std()
            .map(|age| age >= ttl)
            .unwrap_or(false),
        None => false,
    }
}
