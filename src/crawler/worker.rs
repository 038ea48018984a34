//! Crawl worker: the per-task state machine
//!
//! ```text
//! Received → Claiming → Fetching → Extracting → Publishing → Acking
//!     │          │          │                        │
//!     │     duplicate    transient ──────────────────┴──► Requeued
//!     │          │       permanent ───────────────────► DeadLettered
//!     │          │       aborted   ───────────────────► Interrupted
//!     │          ├─► acked
//!     │          └─► Deferred (redelivered, claim still pending)
//! ```
//!
//! Every path settles the delivery exactly once: ack (done, duplicate,
//! dead-lettered) or nack with requeue (requeued, interrupted, deferred).
//! `mark_done` followed by the ack is the single commit point of a crawl.
//!
//! A redelivered message whose URL is still `Pending` may be the only copy
//! of a task whose consumer died after claiming it, so it is requeued
//! rather than acked. It comes back until the holder settles the claim or
//! the claim TTL lets a worker take it over.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::parser::{parse_fetched_page, Link};
use crate::crawler::stats::CrawlStats;
use crate::frontier::{CrawlTask, DeliveryTag, Frontier, FrontierError, FrontierMessage};
use crate::visited::{VisitedError, VisitedSet};
use crate::{Result, RippleError, VisitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-task knobs shared by every worker
#[derive(Debug, Clone)]
pub struct CrawlPolicy {
    /// Upper bound on a single page fetch
    pub fetch_timeout: Duration,

    /// Links deeper than this are not published; `None` means unbounded
    pub max_depth: Option<u32>,

    /// Number of times a transiently failing task is requeued
    pub max_retries: u32,

    /// How long one `pull` waits before the worker checks for shutdown
    pub poll_interval: Duration,
}

impl From<&CrawlerConfig> for CrawlPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout(),
            max_depth: config.max_depth,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

/// How a single task was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Fetched, links published, marked done and acked
    Done { links_published: usize },

    /// Already claimed elsewhere; acked without work
    Duplicate,

    /// Transient failure; nacked back onto the frontier
    Requeued { attempts: u32 },

    /// Permanent failure or retries exhausted; moved to the dead-letter sink
    DeadLettered { reason: String },

    /// Aborted mid-fetch; claim given back and message requeued
    Interrupted,

    /// Redelivered while the URL was still claimed; requeued without work
    Deferred,
}

/// Tracks whether any worker is busy, and since when all have been idle
#[derive(Debug)]
pub(crate) struct Activity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl Activity {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Marks one task in flight until the guard is dropped
    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        InFlight(self.clone())
    }

    /// Time since the last task finished, or `None` while one is in flight
    pub(crate) fn idle_for(&self) -> Option<Duration> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let last_active = *self.last_active.lock().unwrap_or_else(|e| e.into_inner());
        Some(last_active.elapsed())
    }
}

struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A single crawl worker
///
/// Workers are cheap; the supervisor runs several over the same shared
/// frontier, visited set, and fetcher.
pub struct CrawlWorker {
    id: usize,
    frontier: Arc<dyn Frontier>,
    visited: Arc<dyn VisitedSet>,
    fetcher: Arc<dyn PageFetcher>,
    policy: CrawlPolicy,
    stats: Arc<CrawlStats>,
    activity: Arc<Activity>,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl CrawlWorker {
    /// Creates a worker with its own stats and cancellation tokens
    pub fn new(
        id: usize,
        frontier: Arc<dyn Frontier>,
        visited: Arc<dyn VisitedSet>,
        fetcher: Arc<dyn PageFetcher>,
        policy: CrawlPolicy,
    ) -> Self {
        let abort = CancellationToken::new();
        Self {
            id,
            frontier,
            visited,
            fetcher,
            policy,
            stats: Arc::new(CrawlStats::new()),
            activity: Arc::new(Activity::new()),
            shutdown: abort.child_token(),
            abort,
        }
    }

    /// Uses `token` to stop pulling; the task in flight still finishes
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Uses `token` to abort an in-flight fetch and requeue its task
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// Records outcomes into `stats`
    pub fn with_stats(mut self, stats: Arc<CrawlStats>) -> Self {
        self.stats = stats;
        self
    }

    pub(crate) fn with_activity(mut self, activity: Arc<Activity>) -> Self {
        self.activity = activity;
        self
    }

    /// Counters this worker records into
    pub fn stats(&self) -> &Arc<CrawlStats> {
        &self.stats
    }

    /// Pulls and handles tasks until the shutdown or abort token is cancelled
    ///
    /// Returns an error only for failures of the shared infrastructure
    /// (frontier transport or visited set) that the worker cannot settle.
    pub async fn run(&self) -> Result<()> {
        tracing::debug!("Worker {} started", self.id);

        loop {
            let pulled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.abort.cancelled() => break,
                pulled = self.frontier.pull(self.policy.poll_interval) => pulled?,
            };

            let Some(message) = pulled else {
                continue;
            };

            if self.handle(message).await? == TaskOutcome::Interrupted {
                break;
            }
        }

        tracing::debug!("Worker {} stopped", self.id);
        Ok(())
    }

    /// Pulls at most one task and handles it
    ///
    /// Returns `None` if nothing arrived within the poll interval.
    pub async fn process_next(&self) -> Result<Option<TaskOutcome>> {
        match self.frontier.pull(self.policy.poll_interval).await? {
            Some(message) => Ok(Some(self.handle(message).await?)),
            None => Ok(None),
        }
    }

    /// Runs one pulled message through the state machine and settles it
    pub async fn handle(&self, message: FrontierMessage) -> Result<TaskOutcome> {
        let _busy = self.activity.begin();
        self.stats.record_pulled();

        let FrontierMessage {
            task,
            delivery_tag,
            redelivered,
        } = message;

        if redelivered {
            tracing::debug!("Worker {} got redelivered task {}", self.id, task);
        }

        let outcome = self.crawl(&task, delivery_tag, redelivered).await?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    async fn crawl(
        &self,
        task: &CrawlTask,
        tag: DeliveryTag,
        redelivered: bool,
    ) -> Result<TaskOutcome> {
        // Claiming
        if !self.visited.try_claim(&task.url).await? {
            if redelivered && self.claim_pending(&task.url).await? {
                return self.defer(task, tag).await;
            }
            tracing::debug!("Skipping already claimed {}", task.url);
            self.settle(self.frontier.ack(tag).await)?;
            return Ok(TaskOutcome::Duplicate);
        }

        // Fetching
        let fetched = tokio::select! {
            biased;
            _ = self.abort.cancelled() => {
                tracing::info!("Aborted fetch of {}; requeueing", task.url);
                self.visited.unclaim(&task.url).await?;
                self.settle(self.frontier.nack(tag, true).await)?;
                return Ok(TaskOutcome::Interrupted);
            }
            fetched = self.fetcher.fetch(&task.url, self.policy.fetch_timeout) => fetched,
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) if e.is_transient() => {
                return self.retry_or_dead_letter(task, tag, e.to_string()).await;
            }
            Err(e) => return self.dead_letter(task, tag, e.to_string()).await,
        };

        // Extracting: resolve against where the body came from, filter by
        // the queued URL's origin
        let page = parse_fetched_page(&fetched.body, &fetched.url, &task.url);
        tracing::info!(
            "Crawled {} ({}): {} same-origin links",
            task,
            page.title.as_deref().unwrap_or("untitled"),
            page.links.len()
        );

        // Publishing
        let links_published = match self.publish_links(task, &page.links).await {
            Ok(count) => count,
            Err(RippleError::Frontier(e)) => {
                tracing::warn!("Publishing links from {} failed: {}", task.url, e);
                return self
                    .retry_or_dead_letter(task, tag, format!("publish failed: {}", e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        // Acking
        if !self.finish(self.visited.mark_done(&task.url).await)? {
            tracing::warn!("Lost claim on {} before it could be marked done", task.url);
        }
        self.settle(self.frontier.ack(tag).await)?;

        Ok(TaskOutcome::Done { links_published })
    }

    /// Pushes a child task for every link not already claimed or finished
    async fn publish_links(&self, task: &CrawlTask, links: &[Link]) -> Result<usize> {
        let depth = task.depth + 1;
        if let Some(max_depth) = self.policy.max_depth {
            if depth > max_depth {
                tracing::debug!(
                    "Not publishing {} links from {}: depth {} exceeds {}",
                    links.len(),
                    task.url,
                    depth,
                    max_depth
                );
                return Ok(0);
            }
        }

        let mut published = 0;
        for link in links {
            if let Some(record) = self.visited.get(&link.url).await? {
                if record.state != VisitState::Released {
                    continue;
                }
            }

            self.frontier.push(&task.child(link.url.clone())).await?;
            tracing::debug!("Queued {} ({:?})", link.url, link.anchor_text);
            published += 1;
        }

        Ok(published)
    }

    async fn claim_pending(&self, url: &Url) -> Result<bool> {
        Ok(self
            .visited
            .get(url)
            .await?
            .is_some_and(|record| record.state == VisitState::Pending))
    }

    /// Hands a redelivered task back while another claim on its URL is live
    ///
    /// Waits one poll interval first so a stale claim does not spin the
    /// queue until it expires.
    async fn defer(&self, task: &CrawlTask, tag: DeliveryTag) -> Result<TaskOutcome> {
        tracing::debug!("Redelivered {} is still claimed; requeueing", task.url);
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => {}
            _ = tokio::time::sleep(self.policy.poll_interval) => {}
        }
        self.settle(self.frontier.nack(tag, true).await)?;
        Ok(TaskOutcome::Deferred)
    }

    /// Requeues a transiently failed task, or dead-letters it once the retry
    /// budget is spent
    async fn retry_or_dead_letter(
        &self,
        task: &CrawlTask,
        tag: DeliveryTag,
        reason: String,
    ) -> Result<TaskOutcome> {
        // Holding the claim means no other worker is charging attempts
        let charged = self
            .visited
            .get(&task.url)
            .await?
            .map_or(0, |record| record.attempts);

        if charged >= self.policy.max_retries {
            let reason = format!(
                "{} (gave up after {} attempts)",
                reason,
                charged.saturating_add(1)
            );
            return self.dead_letter(task, tag, reason).await;
        }

        let attempts = match self.visited.release(&task.url).await {
            Ok(attempts) => attempts,
            Err(VisitedError::InvalidTransition { .. }) => {
                tracing::warn!("Lost claim on {}; dropping this delivery", task.url);
                self.settle(self.frontier.ack(tag).await)?;
                return Ok(TaskOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "Requeueing {} after attempt {}/{}: {}",
            task.url,
            attempts,
            self.policy.max_retries,
            reason
        );
        self.settle(self.frontier.nack(tag, true).await)?;

        Ok(TaskOutcome::Requeued { attempts })
    }

    /// Moves a task to the dead-letter sink and settles it as failed
    async fn dead_letter(
        &self,
        task: &CrawlTask,
        tag: DeliveryTag,
        reason: String,
    ) -> Result<TaskOutcome> {
        tracing::error!("Dead-lettering {}: {}", task.url, reason);

        if let Err(e) = self.frontier.dead_letter(task, &reason).await {
            // Leave the task retryable rather than losing it
            self.visited.unclaim(&task.url).await?;
            return Err(e.into());
        }

        if !self.finish(self.visited.mark_failed(&task.url).await)? {
            tracing::warn!("Lost claim on {} before it could be marked failed", task.url);
        }
        self.settle(self.frontier.ack(tag).await)?;

        Ok(TaskOutcome::DeadLettered { reason })
    }

    /// Maps a lost claim to `Ok(false)`; other visited-set errors propagate
    fn finish(&self, result: std::result::Result<(), VisitedError>) -> Result<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(VisitedError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Treats acks for unknown or stale deliveries as already settled
    fn settle(&self, result: std::result::Result<(), FrontierError>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(FrontierError::UnknownDelivery(tag)) => {
                tracing::warn!("Worker {}: delivery {} was already settled", self.id, tag);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
