use crate::config::types::{Config, CrawlerConfig, QueueConfig, VisitedConfig};
use crate::ConfigError;

/// Upper bound on concurrent workers per consumer process
const MAX_WORKER_CONCURRENCY: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_queue_config(&config.queue)?;
    validate_crawler_config(&config.crawler)?;
    validate_visited_config(&config.visited)?;

    // A claim must outlive the fetch it guards, or a slow page is crawled twice
    if let Some(ttl) = config.visited.claim_ttl() {
        if ttl <= config.crawler.fetch_timeout() {
            return Err(ConfigError::Validation(format!(
                "claim TTL ({}s) must exceed fetch_timeout_seconds ({}s)",
                ttl.as_secs(),
                config.crawler.fetch_timeout_seconds
            )));
        }
    }

    Ok(())
}

/// Validates queue connection configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::Validation("queue host cannot be empty".to_string()));
    }

    if config.port == 0 {
        return Err(ConfigError::Validation("queue port cannot be 0".to_string()));
    }

    if config.name.is_empty() {
        return Err(ConfigError::Validation("queue name cannot be empty".to_string()));
    }

    // AMQP short strings are limited to 255 bytes; leave room for the
    // dead-letter suffix.
    if config.name.len() > 200 {
        return Err(ConfigError::Validation(format!(
            "queue name must be at most 200 bytes, got {}",
            config.name.len()
        )));
    }

    if config.reconnect_attempts < 1 {
        return Err(ConfigError::Validation(
            "reconnect_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_concurrency < 1 || config.worker_concurrency > MAX_WORKER_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "worker_concurrency must be between 1 and {}, got {}",
            MAX_WORKER_CONCURRENCY, config.worker_concurrency
        )));
    }

    if config.fetch_timeout_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_seconds must be >= 1, got {}",
            config.fetch_timeout_seconds
        )));
    }

    if config.poll_interval_ms < 10 || config.poll_interval_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be between 10 and 60000, got {}",
            config.poll_interval_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates visited-set configuration
fn validate_visited_config(config: &VisitedConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.database_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "visited database_path cannot be blank".to_string(),
            ));
        }
    }

    if config.claim_ttl_seconds == Some(0) {
        return Err(ConfigError::Validation(
            "claim_ttl_seconds must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}
