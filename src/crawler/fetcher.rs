//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - GET requests with a per-request timeout
//! - Classifying failures into transient and permanent errors

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirect hops followed for a single fetch
pub const MAX_REDIRECTS: usize = 10;

/// Why a page could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("could not decode body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Returns true if retrying the same fetch later may succeed
    ///
    /// | Error | Transient |
    /// |-------|-----------|
    /// | Timeout | yes |
    /// | Connection | yes |
    /// | HTTP 5xx, HTTP 429 | yes |
    /// | Other HTTP statuses | no |
    /// | Decode | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Http(status) => *status == 429 || (500..600).contains(status),
            Self::Decode(_) => false,
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL the body was served from, after redirects and as the server sent it
    ///
    /// Relative links resolve against this, not the queued URL.
    pub url: Url,

    /// Decoded response body
    pub body: String,
}

/// Fetches page bodies
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use ripple_queue::crawler::build_http_client;
///
/// let client = build_http_client("RippleQueue/0.1").unwrap();
/// ```
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageFetcher` backed by a shared `reqwest` connection pool
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher that identifies itself as `user_agent`
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent)?,
        })
    }
}

/// Maps a transport-level reqwest error onto the fetch error taxonomy
fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_body() {
        // The response stream broke off mid-body
        FetchError::Connection(error.to_string())
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else if let Some(status) = error.status() {
        FetchError::Http(status.as_u16())
    } else {
        // Connect, TLS and redirect failures all surface here
        FetchError::Connection(error.to_string())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let final_url = response.url().clone();
        if &final_url != url {
            tracing::debug!("{} redirected to {}", url, final_url);
        }

        let body = response.text().await.map_err(classify)?;
        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }
}
