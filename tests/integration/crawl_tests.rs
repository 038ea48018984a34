//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the real
//! HTTP fetcher through workers and supervisors end-to-end, with the
//! in-memory frontier standing in for the broker.

use ripple_queue::config::{CrawlerConfig, VisitedConfig};
use ripple_queue::crawler::{
    CrawlPolicy, CrawlWorker, HttpFetcher, IdlePolicy, Supervisor, TaskOutcome,
};
use ripple_queue::frontier::{CrawlTask, Frontier, MemoryFrontier};
use ripple_queue::visited::{open_visited_set, MemoryVisitedSet, VisitedSet};
use ripple_queue::{normalize_url, VisitState};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_policy(max_retries: u32) -> CrawlPolicy {
    CrawlPolicy {
        fetch_timeout: Duration::from_secs(5),
        max_depth: None,
        max_retries,
        poll_interval: Duration::from_millis(20),
    }
}

fn test_crawler_config(concurrency: usize) -> CrawlerConfig {
    CrawlerConfig {
        worker_concurrency: concurrency,
        poll_interval_ms: 20,
        user_agent: "RippleQueueTest/1.0".to_string(),
        ..CrawlerConfig::default()
    }
}

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new("RippleQueueTest/1.0").unwrap())
}

fn page_url(server: &MockServer, page: &str) -> Url {
    normalize_url(&format!("{}{}", server.uri(), page)).unwrap()
}

async fn mount_page(server: &MockServer, page: &str, body: &str, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .expect(expected_fetches)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_seed_publishes_only_same_origin_links() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body>
            <a href="/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="https://elsewhere.test/page3">Elsewhere</a>
        </body></html>"#,
        1,
    )
    .await;

    let frontier = Arc::new(MemoryFrontier::new());
    let visited = Arc::new(MemoryVisitedSet::new());
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        visited.clone(),
        fetcher(),
        test_policy(3),
    );

    let seed = page_url(&server, "/");
    frontier.push(&CrawlTask::seed(seed.clone())).await.unwrap();

    let outcome = worker.process_next().await.unwrap();
    assert_eq!(outcome, Some(TaskOutcome::Done { links_published: 2 }));

    let queued = frontier.pending_tasks();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].url, page_url(&server, "/page1"));
    assert_eq!(queued[1].url, page_url(&server, "/page2"));
    assert!(queued.iter().all(|task| task.depth == 1));
    assert!(queued
        .iter()
        .all(|task| task.url.host_str() != Some("elsewhere.test")));

    let record = visited.get(&seed).await.unwrap().unwrap();
    assert_eq!(record.state, VisitState::Done);
    assert_eq!(visited.len(), 1);
}

#[tokio::test]
async fn test_redelivered_seed_is_not_fetched_again() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "<html><body>no links</body></html>", 1).await;

    let frontier = Arc::new(MemoryFrontier::new());
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        Arc::new(MemoryVisitedSet::new()),
        fetcher(),
        test_policy(3),
    );

    let seed = CrawlTask::seed(page_url(&server, "/"));
    frontier.push(&seed).await.unwrap();
    frontier.push(&seed).await.unwrap();

    assert_eq!(
        worker.process_next().await.unwrap(),
        Some(TaskOutcome::Done { links_published: 0 })
    );
    assert_eq!(
        worker.process_next().await.unwrap(),
        Some(TaskOutcome::Duplicate)
    );
    assert_eq!(frontier.pushed_count(), 2);
    assert_eq!(frontier.unacked_count(), 0);
}

#[tokio::test]
async fn test_server_errors_retried_then_dead_lettered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let frontier = Arc::new(MemoryFrontier::new());
    let visited = Arc::new(MemoryVisitedSet::new());
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        visited.clone(),
        fetcher(),
        test_policy(2),
    );

    let flaky = page_url(&server, "/flaky");
    frontier.push(&CrawlTask::seed(flaky.clone())).await.unwrap();

    let mut requeues = 0;
    while let Some(outcome) = worker.process_next().await.unwrap() {
        if let TaskOutcome::Requeued { .. } = outcome {
            requeues += 1;
        }
    }

    assert_eq!(requeues, 2);
    let dead = frontier.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].task.url, flaky);
    assert!(dead[0].reason.contains("HTTP 503"));
    assert_eq!(
        visited.get(&flaky).await.unwrap().unwrap().state,
        VisitState::Failed
    );
}

#[tokio::test]
async fn test_not_found_dead_lettered_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let frontier = Arc::new(MemoryFrontier::new());
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        Arc::new(MemoryVisitedSet::new()),
        fetcher(),
        test_policy(3),
    );
    frontier
        .push(&CrawlTask::seed(page_url(&server, "/missing")))
        .await
        .unwrap();

    let outcome = worker.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, TaskOutcome::DeadLettered { .. }));
    assert!(frontier.is_empty());
}

#[tokio::test]
async fn test_supervisor_crawls_cyclic_site_once() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/a">A</a><a href="/b">B</a><a href="https://elsewhere.test/">X</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/a", r#"<a href="/">Home</a><a href="/b">B</a>"#, 1).await;
    mount_page(&server, "/b", r#"<a href="/a">A</a><a href="/c">C</a>"#, 1).await;
    mount_page(&server, "/c", r#"<a href="/">Home</a>"#, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let visited = open_visited_set(&VisitedConfig {
        database_path: Some(dir.path().join("visited.db").display().to_string()),
        claim_ttl_seconds: None,
    })
    .unwrap();

    let frontier = Arc::new(MemoryFrontier::new());
    frontier
        .push(&CrawlTask::seed(page_url(&server, "/")))
        .await
        .unwrap();

    let supervisor = Supervisor::new(
        &test_crawler_config(4),
        frontier.clone(),
        visited.clone(),
        fetcher(),
    )
    .with_idle_policy(IdlePolicy::Exit(Duration::from_millis(300)));

    let stats = tokio::time::timeout(Duration::from_secs(20), supervisor.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.done, 4);
    assert_eq!(stats.dead_lettered, 0);
    assert_eq!(visited.count_by_state(VisitState::Done).await.unwrap(), 4);
    assert!(frontier.is_empty());
    assert_eq!(frontier.unacked_count(), 0);
}

#[tokio::test]
async fn test_two_consumers_share_sqlite_visited_set() {
    let server = MockServer::start().await;
    let mut hub = String::new();
    for i in 0..10 {
        hub.push_str(&format!(r#"<a href="/p{}">{}</a>"#, i, i));
        mount_page(&server, &format!("/p{}", i), r#"<a href="/">hub</a>"#, 1).await;
    }
    mount_page(&server, "/", &hub, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = VisitedConfig {
        database_path: Some(dir.path().join("visited.db").display().to_string()),
        claim_ttl_seconds: None,
    };

    // Each consumer opens its own connection, as separate processes would
    let frontier = Arc::new(MemoryFrontier::new());
    let first: Arc<dyn VisitedSet> = open_visited_set(&config).unwrap();
    let second: Arc<dyn VisitedSet> = open_visited_set(&config).unwrap();

    // The same URL seeded twice must still be crawled once
    let seed = CrawlTask::seed(page_url(&server, "/"));
    frontier.push(&seed).await.unwrap();
    frontier.push(&seed).await.unwrap();

    let make = |visited: Arc<dyn VisitedSet>| {
        Supervisor::new(&test_crawler_config(3), frontier.clone(), visited, fetcher())
            .with_idle_policy(IdlePolicy::Exit(Duration::from_millis(300)))
    };
    let (a, b) = (make(first), make(second.clone()));

    let (a, b) = tokio::time::timeout(Duration::from_secs(20), async {
        tokio::join!(a.run(), b.run())
    })
    .await
    .unwrap();
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.done + b.done, 11);
    assert_eq!(second.count_by_state(VisitState::Done).await.unwrap(), 11);
}

#[tokio::test]
async fn test_directory_page_links_resolve_under_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/docs/",
        r#"<a href="intro">Intro</a><a href="./setup/">Setup</a>"#,
        1,
    )
    .await;

    let frontier = Arc::new(MemoryFrontier::new());
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        Arc::new(MemoryVisitedSet::new()),
        fetcher(),
        test_policy(3),
    );
    frontier
        .push(&CrawlTask::seed(page_url(&server, "/docs/")))
        .await
        .unwrap();

    let outcome = worker.process_next().await.unwrap();
    assert_eq!(outcome, Some(TaskOutcome::Done { links_published: 2 }));

    let queued: Vec<Url> = frontier.pending_tasks().into_iter().map(|t| t.url).collect();
    assert_eq!(
        queued,
        vec![
            page_url(&server, "/docs/intro"),
            page_url(&server, "/docs/setup")
        ]
    );
}

#[tokio::test]
async fn test_claim_orphaned_by_crashed_consumer_is_recrawled() {
    let server = MockServer::start().await;
    mount_page(&server, "/p", "<html></html>", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = VisitedConfig {
        database_path: Some(dir.path().join("visited.db").display().to_string()),
        claim_ttl_seconds: Some(1),
    };
    let task = CrawlTask::seed(page_url(&server, "/p"));
    let frontier = Arc::new(MemoryFrontier::new());

    // The first consumer claims the URL and dies before settling anything;
    // the broker hands its unacked message out again.
    {
        let crashed = open_visited_set(&config).unwrap();
        assert!(crashed.try_claim(&task.url).await.unwrap());
        frontier.push(&task).await.unwrap();
        let message = frontier.pull(Duration::ZERO).await.unwrap().unwrap();
        frontier.nack(message.delivery_tag, true).await.unwrap();
    }

    let visited = open_visited_set(&config).unwrap();
    let worker = CrawlWorker::new(
        0,
        frontier.clone(),
        visited.clone(),
        fetcher(),
        test_policy(3),
    );

    let outcomes = tokio::time::timeout(Duration::from_secs(10), async {
        let mut outcomes = Vec::new();
        loop {
            let Some(outcome) = worker.process_next().await.unwrap() else {
                continue;
            };
            let done = matches!(outcome, TaskOutcome::Done { .. });
            outcomes.push(outcome);
            if done {
                return outcomes;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(outcomes[0], TaskOutcome::Deferred);
    assert_eq!(
        visited.get(&task.url).await.unwrap().unwrap().state,
        VisitState::Done
    );
    assert!(frontier.is_empty());
    assert_eq!(frontier.unacked_count(), 0);
}
