use serde::Deserialize;
use std::time::Duration;

/// Default AMQP port
pub const DEFAULT_QUEUE_PORT: u16 = 5672;
/// Default frontier queue name
pub const DEFAULT_QUEUE_NAME: &str = "crawl_frontier";
/// Default per-fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;
/// Default number of concurrent workers
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
/// Default idle timeout in seconds (0 disables idle exit)
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 10;
/// Default number of requeues granted to a transiently failing task
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Claim TTL applied to a shared (SQLite) visited set when none is configured
pub const DEFAULT_SHARED_CLAIM_TTL_SECONDS: u64 = 300;

/// Main configuration structure for Ripple-Queue
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub visited: VisitedConfig,
}

/// How crawl tasks are encoded on the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON object carrying url, depth, and enqueue time
    #[default]
    Json,
    /// A bare UTF-8 URL; depth is not carried
    Plain,
}

/// Message queue connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Broker host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default = "default_credential")]
    pub user: String,

    /// Login password
    #[serde(default = "default_credential")]
    pub password: String,

    /// AMQP virtual host
    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Name of the durable frontier queue
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Connection attempts before a transport failure is reported
    #[serde(rename = "reconnect-attempts", default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Encoding used when publishing tasks
    #[serde(rename = "wire-format", default)]
    pub wire_format: WireFormat,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Timeout for a single page fetch (seconds)
    #[serde(rename = "fetch-timeout-seconds", default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Maximum link depth to follow from a seed; unbounded when absent
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Number of concurrent crawl workers
    #[serde(rename = "worker-concurrency", default = "default_concurrency")]
    pub worker_concurrency: usize,

    /// Stop after this long without work (seconds); 0 keeps polling forever
    #[serde(rename = "idle-timeout-seconds", default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Requeues granted to a task that keeps failing transiently
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Longest a single frontier pull waits for a message (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// User-Agent header sent with every fetch
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl CrawlerConfig {
    /// The per-fetch timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// The idle timeout, or None if idle exit is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }

    /// The frontier poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Visited-set backend configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitedConfig {
    /// SQLite database shared by all consumers on a host; in-memory when absent
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    /// A pending claim older than this may be taken over (seconds)
    ///
    /// Defaults to `DEFAULT_SHARED_CLAIM_TTL_SECONDS` when `database_path` is
    /// set, so a claim left behind by a crashed consumer eventually expires.
    /// In-memory claims die with their process and never expire by default.
    #[serde(rename = "claim-ttl-seconds", default)]
    pub claim_ttl_seconds: Option<u64>,
}

impl VisitedConfig {
    /// The effective claim TTL
    pub fn claim_ttl(&self) -> Option<Duration> {
        match (self.claim_ttl_seconds, &self.database_path) {
            (Some(seconds), _) => Some(Duration::from_secs(seconds)),
            (None, Some(_)) => Some(Duration::from_secs(DEFAULT_SHARED_CLAIM_TTL_SECONDS)),
            (None, None) => None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_credential(),
            password: default_credential(),
            vhost: default_vhost(),
            name: default_queue_name(),
            reconnect_attempts: default_reconnect_attempts(),
            wire_format: WireFormat::default(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: default_fetch_timeout(),
            max_depth: None,
            worker_concurrency: default_concurrency(),
            idle_timeout_seconds: default_idle_timeout(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_QUEUE_PORT
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECONDS
}

fn default_concurrency() -> usize {
    DEFAULT_WORKER_CONCURRENCY
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECONDS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_user_agent() -> String {
    format!("RippleQueue/{}", env!("CARGO_PKG_VERSION"))
}
