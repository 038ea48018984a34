//! Crawl statistics
//!
//! Workers bump shared atomic counters as tasks settle; a `StatsSnapshot`
//! is a plain copy for logging and assertions.

use crate::crawler::worker::TaskOutcome;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every worker of a supervisor
#[derive(Debug, Default)]
pub struct CrawlStats {
    pulled: AtomicU64,
    done: AtomicU64,
    duplicates: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    interrupted: AtomicU64,
    deferred: AtomicU64,
    links_published: AtomicU64,
}

/// Point-in-time copy of `CrawlStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages pulled from the frontier
    pub pulled: u64,

    /// Pages fetched, extracted and acked
    pub done: u64,

    /// Messages acked without work because the URL was already claimed
    pub duplicates: u64,

    /// Tasks returned to the frontier after a transient failure
    pub requeued: u64,

    /// Tasks moved to the dead-letter sink
    pub dead_lettered: u64,

    /// Tasks handed back because shutdown interrupted them
    pub interrupted: u64,

    /// Redeliveries handed back because their URL was still claimed
    pub deferred: u64,

    /// New tasks pushed for discovered links
    pub links_published: u64,
}

impl CrawlStats {
    /// Creates zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_pulled(&self) {
        self.pulled.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a settled task
    pub(crate) fn record(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Done { links_published } => {
                self.links_published
                    .fetch_add(*links_published as u64, Ordering::Relaxed);
                &self.done
            }
            TaskOutcome::Duplicate => &self.duplicates,
            TaskOutcome::Requeued { .. } => &self.requeued,
            TaskOutcome::DeadLettered { .. } => &self.dead_lettered,
            TaskOutcome::Interrupted => &self.interrupted,
            TaskOutcome::Deferred => &self.deferred,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulled: self.pulled.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            links_published: self.links_published.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pulled, {} done, {} duplicates, {} requeued, {} dead-lettered, {} interrupted, {} deferred, {} links published",
            self.pulled,
            self.done,
            self.duplicates,
            self.requeued,
            self.dead_lettered,
            self.interrupted,
            self.deferred,
            self.links_published
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let stats = CrawlStats::new();
        stats.record_pulled();
        stats.record_pulled();
        stats.record_pulled();
        stats.record(&TaskOutcome::Done { links_published: 4 });
        stats.record(&TaskOutcome::Duplicate);
        stats.record(&TaskOutcome::Requeued { attempts: 1 });
        stats.record(&TaskOutcome::Deferred);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pulled, 3);
        assert_eq!(snapshot.done, 1);
        assert_eq!(snapshot.links_published, 4);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.requeued, 1);
        assert_eq!(snapshot.dead_lettered, 0);
        assert_eq!(snapshot.deferred, 1);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = StatsSnapshot {
            done: 2,
            ..Default::default()
        };
        assert!(snapshot.to_string().contains("2 done"));
    }
}
