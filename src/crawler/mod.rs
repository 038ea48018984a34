//! Crawler module: the fetch → extract → dedup → enqueue engine
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with typed, classified errors
//! - HTML parsing and same-origin link extraction
//! - The per-task worker state machine
//! - The supervisor that runs workers concurrently

mod fetcher;
mod parser;
mod stats;
mod supervisor;
mod worker;

pub use fetcher::{
    build_http_client, FetchError, FetchedPage, HttpFetcher, PageFetcher, MAX_REDIRECTS,
};
pub use parser::{extract_links, parse_fetched_page, parse_page, Link, ParsedPage};
pub use stats::{CrawlStats, StatsSnapshot};
pub use supervisor::{IdlePolicy, Supervisor};
pub use worker::{CrawlPolicy, CrawlWorker, TaskOutcome};
