use crate::config::types::{Config, WireFormat};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use ripple_queue::config::load_config;
///
/// let config = load_config(Path::new("ripple.toml")).unwrap();
/// println!("Workers: {}", config.crawler.worker_concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so operators can tell which configuration a consumer
/// was started with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads the configuration from `path` if given, otherwise from the environment
///
/// The hash of a configuration file is logged so runs can be matched to the
/// file they were started with.
pub fn resolve_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            let config = from_env()?;
            tracing::debug!("Configuration loaded from environment");
            Ok(config)
        }
    }
}

/// Builds the configuration from process environment variables
///
/// A `.env` file in the working directory is loaded first if present;
/// variables already set in the environment win.
pub fn from_env() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    from_lookup(|name| std::env::var(name).ok())
}

/// Builds the configuration from an arbitrary variable lookup
///
/// Every `QUEUE_*` variable falls back to its legacy `RABBITMQ_*` name.
/// Unset or empty variables keep their defaults.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    let vars = EnvVars { lookup: &lookup };

    if let Some(host) = vars.string(&["QUEUE_HOST", "RABBITMQ_HOST"]) {
        config.queue.host = host;
    }
    if let Some(port) = vars.parse(&["QUEUE_PORT", "RABBITMQ_PORT"])? {
        config.queue.port = port;
    }
    if let Some(user) = vars.string(&["QUEUE_USER", "RABBITMQ_USER"]) {
        config.queue.user = user;
    }
    if let Some(password) = vars.string(&["QUEUE_PASSWORD", "RABBITMQ_PASSWORD"]) {
        config.queue.password = password;
    }
    if let Some(vhost) = vars.string(&["QUEUE_VHOST", "RABBITMQ_VHOST"]) {
        config.queue.vhost = vhost;
    }
    if let Some(name) = vars.string(&["QUEUE_NAME"]) {
        config.queue.name = name;
    }
    if let Some(attempts) = vars.parse(&["RECONNECT_ATTEMPTS"])? {
        config.queue.reconnect_attempts = attempts;
    }
    if let Some((var, format)) = vars.named(&["WIRE_FORMAT"]) {
        config.queue.wire_format = parse_wire_format(&var, &format)?;
    }

    if let Some(timeout) = vars.parse(&["FETCH_TIMEOUT_SECONDS"])? {
        config.crawler.fetch_timeout_seconds = timeout;
    }
    config.crawler.max_depth = vars.parse(&["MAX_DEPTH"])?;
    if let Some(concurrency) = vars.parse(&["WORKER_CONCURRENCY"])? {
        config.crawler.worker_concurrency = concurrency;
    }
    if let Some(idle) = vars.parse(&["IDLE_TIMEOUT_SECONDS"])? {
        config.crawler.idle_timeout_seconds = idle;
    }
    if let Some(retries) = vars.parse(&["MAX_RETRIES"])? {
        config.crawler.max_retries = retries;
    }
    if let Some(interval) = vars.parse(&["POLL_INTERVAL_MS"])? {
        config.crawler.poll_interval_ms = interval;
    }
    if let Some(agent) = vars.string(&["USER_AGENT"]) {
        config.crawler.user_agent = agent;
    }

    config.visited.database_path = vars.string(&["VISITED_DB_PATH"]);
    config.visited.claim_ttl_seconds = vars.parse(&["CLAIM_TTL_SECONDS"])?;

    validate(&config)?;
    Ok(config)
}

/// Variable lookup with fallback names
struct EnvVars<'a, F> {
    lookup: &'a F,
}

impl<'a, F> EnvVars<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Returns the first non-empty value together with the name it came from
    fn named(&self, names: &[&str]) -> Option<(String, String)> {
        names.iter().find_map(|name| {
            (self.lookup)(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (name.to_string(), v))
        })
    }

    fn string(&self, names: &[&str]) -> Option<String> {
        self.named(names).map(|(_, value)| value)
    }

    fn parse<T>(&self, names: &[&str]) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.named(names) {
            Some((var, value)) => value
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Env {
                    var,
                    message: format!("'{}': {}", value, e),
                }),
            None => Ok(None),
        }
    }
}

fn parse_wire_format(var: &str, value: &str) -> Result<WireFormat, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Ok(WireFormat::Json),
        "plain" | "url" => Ok(WireFormat::Plain),
        other => Err(ConfigError::Env {
            var: var.to_string(),
            message: format!("unknown wire format '{}', expected 'json' or 'plain'", other),
        }),
    }
}
