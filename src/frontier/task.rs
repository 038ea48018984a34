//! Crawl task definitions

use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// A unit of crawl work carried through the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// The normalized URL to crawl
    pub url: Url,

    /// Link distance from the seed (seeds are depth 0)
    pub depth: u32,

    /// When the task was published
    pub enqueued_at: DateTime<Utc>,
}

impl CrawlTask {
    /// Creates a depth-0 task for a seed URL
    pub fn seed(url: Url) -> Self {
        Self::new(url, 0)
    }

    /// Creates a task at the given depth, enqueued now
    pub fn new(url: Url, depth: u32) -> Self {
        Self {
            url,
            depth,
            enqueued_at: Utc::now(),
        }
    }

    /// Creates the task for a link discovered on this task's page
    pub fn child(&self, url: Url) -> Self {
        Self::new(url, self.depth.saturating_add(1))
    }
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (depth {})", self.url, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_increments_depth() {
        let seed = CrawlTask::seed(Url::parse("https://example.com/").unwrap());
        let child = seed.child(Url::parse("https://example.com/a").unwrap());
        assert_eq!(seed.depth, 0);
        assert_eq!(child.depth, 1);
        assert_eq!(child.child(seed.url.clone()).depth, 2);
    }

    #[test]
    fn test_display() {
        let task = CrawlTask::new(Url::parse("https://example.com/a").unwrap(), 3);
        assert_eq!(task.to_string(), "https://example.com/a (depth 3)");
    }
}
