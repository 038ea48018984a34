//! Supervisor: runs a pool of crawl workers
//!
//! All workers share one frontier, visited set, fetcher and stats block,
//! plus two cancellation tokens:
//!
//! - `shutdown` stops new pulls; tasks already in flight run to completion.
//!   The idle watchdog and the caller (first Ctrl-C) cancel it.
//! - `abort` additionally interrupts in-flight fetches, whose tasks are
//!   requeued. It is the parent of `shutdown`, and a worker that fails or
//!   panics cancels it, so one broken worker brings the others down.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::stats::{CrawlStats, StatsSnapshot};
use crate::crawler::worker::{Activity, CrawlPolicy, CrawlWorker};
use crate::frontier::Frontier;
use crate::visited::VisitedSet;
use crate::{Result, RippleError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the supervisor does when the frontier runs dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Stop once nothing has been in flight or pulled for this long
    Exit(Duration),

    /// Keep polling until shut down
    KeepPolling,
}

impl IdlePolicy {
    /// `Exit` for a configured timeout, `KeepPolling` when there is none
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => Self::Exit(timeout),
            None => Self::KeepPolling,
        }
    }
}

/// Runs `worker_concurrency` crawl workers until shutdown or idleness
pub struct Supervisor {
    frontier: Arc<dyn Frontier>,
    visited: Arc<dyn VisitedSet>,
    fetcher: Arc<dyn PageFetcher>,
    policy: CrawlPolicy,
    concurrency: usize,
    idle: IdlePolicy,
    stats: Arc<CrawlStats>,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor configured from the crawler settings
    pub fn new(
        config: &CrawlerConfig,
        frontier: Arc<dyn Frontier>,
        visited: Arc<dyn VisitedSet>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let abort = CancellationToken::new();
        Self {
            frontier,
            visited,
            fetcher,
            policy: CrawlPolicy::from(config),
            concurrency: config.worker_concurrency.max(1),
            idle: IdlePolicy::from_timeout(config.idle_timeout()),
            stats: Arc::new(CrawlStats::new()),
            shutdown: abort.child_token(),
            abort,
        }
    }

    /// Overrides the idle policy derived from the configuration
    pub fn with_idle_policy(mut self, idle: IdlePolicy) -> Self {
        self.idle = idle;
        self
    }

    /// Overrides the per-task policy derived from the configuration
    pub fn with_policy(mut self, policy: CrawlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that stops workers from pulling new tasks when cancelled
    ///
    /// A supervisor runs once: after its token is cancelled, `run` returns
    /// immediately.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Token that also aborts in-flight fetches when cancelled
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Live counters, readable while `run` is in progress
    pub fn stats(&self) -> Arc<CrawlStats> {
        self.stats.clone()
    }

    /// Runs the workers to completion
    ///
    /// Returns the final counters, or the first error a worker failed with.
    pub async fn run(&self) -> Result<StatsSnapshot> {
        tracing::info!(
            "Starting {} workers (idle policy: {:?})",
            self.concurrency,
            self.idle
        );

        let activity = Arc::new(Activity::new());

        let watchdog = match self.idle {
            IdlePolicy::Exit(idle) => Some(tokio::spawn(watch_idle(
                activity.clone(),
                idle,
                self.shutdown.clone(),
            ))),
            IdlePolicy::KeepPolling => None,
        };

        let mut handles = Vec::with_capacity(self.concurrency);
        for id in 0..self.concurrency {
            let worker = CrawlWorker::new(
                id,
                self.frontier.clone(),
                self.visited.clone(),
                self.fetcher.clone(),
                self.policy.clone(),
            )
            .with_shutdown(self.shutdown.clone())
            .with_abort(self.abort.clone())
            .with_stats(self.stats.clone())
            .with_activity(activity.clone());

            // A failing or panicking worker aborts the whole pool
            let guard = self.abort.clone().drop_guard();
            handles.push((
                id,
                tokio::spawn(async move {
                    let result = worker.run().await;
                    if result.is_ok() {
                        guard.disarm();
                    }
                    result
                }),
            ));
        }

        let mut first_error = None;
        for (id, handle) in handles {
            let error = match handle.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => RippleError::WorkerJoin {
                    worker: id,
                    message: e.to_string(),
                },
            };
            tracing::error!("Worker {} failed: {}", id, error);
            first_error.get_or_insert(error);
        }

        self.shutdown.cancel();
        if let Some(watchdog) = watchdog {
            let _ = watchdog.await;
        }

        let snapshot = self.stats.snapshot();
        tracing::info!("Crawl finished: {}", snapshot);

        match first_error {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }
}

/// Cancels `shutdown` once the pool has been idle for `idle`
async fn watch_idle(activity: Arc<Activity>, idle: Duration, shutdown: CancellationToken) {
    let tick = (idle / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(tick) => {}
        }

        if let Some(idle_for) = activity.idle_for() {
            if idle_for >= idle {
                tracing::info!("No work for {:?}; shutting down", idle_for);
                shutdown.cancel();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::ScriptedFetcher;
    use crate::frontier::{CrawlTask, MemoryFrontier};
    use crate::visited::MemoryVisitedSet;
    use crate::VisitState;
    use url::Url;

    fn config(concurrency: usize) -> CrawlerConfig {
        CrawlerConfig {
            worker_concurrency: concurrency,
            idle_timeout_seconds: 1,
            poll_interval_ms: 20,
            ..CrawlerConfig::default()
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_idle_policy_from_timeout() {
        assert_eq!(
            IdlePolicy::from_timeout(Some(Duration::from_secs(3))),
            IdlePolicy::Exit(Duration::from_secs(3))
        );
        assert_eq!(IdlePolicy::from_timeout(None), IdlePolicy::KeepPolling);
    }

    #[tokio::test]
    async fn test_crawls_cyclic_site_once_per_page() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page("https://a.com/", r#"<a href="/b">b</a><a href="/c">c</a>"#)
                .page("https://a.com/b", r#"<a href="/">home</a><a href="/c">c</a>"#)
                .page("https://a.com/c", r#"<a href="/b">b</a><a href="/">home</a>"#),
        );
        let frontier = Arc::new(MemoryFrontier::new());
        let visited = Arc::new(MemoryVisitedSet::new());
        frontier
            .push(&CrawlTask::seed(url("https://a.com/")))
            .await
            .unwrap();

        let supervisor = Supervisor::new(
            &config(4),
            frontier.clone(),
            visited.clone(),
            fetcher.clone(),
        )
        .with_idle_policy(IdlePolicy::Exit(Duration::from_millis(200)));

        let stats = tokio::time::timeout(Duration::from_secs(10), supervisor.run())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.done, 3);
        for page in ["https://a.com/", "https://a.com/b", "https://a.com/c"] {
            assert_eq!(fetcher.calls(page), 1, "{} fetched more than once", page);
        }
        assert_eq!(
            visited.count_by_state(VisitState::Done).await.unwrap(),
            3
        );
        assert!(frontier.is_empty());
        assert_eq!(frontier.unacked_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_exit_on_empty_frontier() {
        let supervisor = Supervisor::new(
            &config(2),
            Arc::new(MemoryFrontier::new()),
            Arc::new(MemoryVisitedSet::new()),
            Arc::new(ScriptedFetcher::new()),
        )
        .with_idle_policy(IdlePolicy::Exit(Duration::from_millis(100)));

        let stats = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, StatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_keep_polling_until_cancelled() {
        let supervisor = Supervisor::new(
            &config(2),
            Arc::new(MemoryFrontier::new()),
            Arc::new(MemoryVisitedSet::new()),
            Arc::new(ScriptedFetcher::new()),
        )
        .with_idle_policy(IdlePolicy::KeepPolling);
        let token = supervisor.shutdown_token();

        let run = supervisor.run();
        tokio::pin!(run);

        // Still running well past any idle timeout
        assert!(tokio::time::timeout(Duration::from_millis(300), &mut run)
            .await
            .is_err());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_error_stops_pool() {
        let frontier = Arc::new(MemoryFrontier::new());
        frontier.close().await.unwrap();

        let supervisor = Supervisor::new(
            &config(3),
            frontier,
            Arc::new(MemoryVisitedSet::new()),
            Arc::new(ScriptedFetcher::new()),
        )
        .with_idle_policy(IdlePolicy::KeepPolling);

        let result = tokio::time::timeout(Duration::from_secs(2), supervisor.run())
            .await
            .unwrap();
        assert!(matches!(
            result,
            Err(RippleError::Frontier(crate::frontier::FrontierError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_abort_requeues_in_flight_tasks() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page("https://a.com/slow", "<html></html>")
                .with_delay(Duration::from_secs(30)),
        );
        let frontier = Arc::new(MemoryFrontier::new());
        let visited = Arc::new(MemoryVisitedSet::new());
        frontier
            .push(&CrawlTask::seed(url("https://a.com/slow")))
            .await
            .unwrap();

        let supervisor = Supervisor::new(&config(2), frontier.clone(), visited.clone(), fetcher)
            .with_idle_policy(IdlePolicy::KeepPolling);
        let abort = supervisor.abort_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            abort.cancel();
        });

        let stats = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.interrupted, 1);
        assert_eq!(frontier.len(), 1);
        let record = visited
            .get(&url("https://a.com/slow"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.state, VisitState::Released);
    }
}
