//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use inbound::{QueueOptions, StaticTokenAuthority, VerifiedClaims};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("AUTH_TOKENS entry {0:?} is not of the form token=principal[:keyId]")]
    MalformedToken(String),
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings of the in-process processing queue and its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub max_receive_count: u32,
    pub parallel: bool,
    pub continue_on_error: bool,
    pub verbose: bool,
}

impl QueueConfig {
    /// The adapter options these settings select.
    pub fn options(&self) -> QueueOptions {
        QueueOptions {
            process_in_parallel: self.parallel,
            continue_on_error: self.continue_on_error,
            verbose_logging: self.verbose,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(250),
            visibility_timeout: Duration::from_millis(30_000),
            max_receive_count: 5,
            parallel: true,
            continue_on_error: true,
            verbose: false,
        }
    }
}

/// Fixed-delay retry around LLM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// One development bearer token and the identity it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub principal_id: String,
    pub key_id: Option<String>,
}

impl FromStr for TokenGrant {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedToken(entry.to_string());
        let (token, identity) = entry.split_once('=').ok_or_else(malformed)?;
        let (principal, key_id) = match identity.split_once(':') {
            Some((principal, key_id)) => (principal, Some(key_id.trim())),
            None => (identity, None),
        };
        let (token, principal) = (token.trim(), principal.trim());
        if token.is_empty() || principal.is_empty() || key_id.is_some_and(str::is_empty) {
            return Err(malformed());
        }
        Ok(Self {
            token: token.to_string(),
            principal_id: principal.to_string(),
            key_id: key_id.map(str::to_string),
        })
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: Postgres item store; unset selects the in-memory store
/// - `ITEMS_TABLE`: item table name (default `items`)
/// - `QUEUE_BATCH_SIZE`, `QUEUE_POLL_INTERVAL_MS`, `QUEUE_VISIBILITY_TIMEOUT_MS`,
///   `QUEUE_MAX_RECEIVE_COUNT`, `QUEUE_PARALLEL`, `QUEUE_CONTINUE_ON_ERROR`,
///   `QUEUE_VERBOSE`: see [`QueueConfig`]
/// - `LLM_RETRY_MAX_ATTEMPTS`, `LLM_RETRY_DELAY_MS`: see [`RetryConfig`]
/// - `AUTH_TOKENS`: comma-separated `token=principal[:keyId]` grants
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub items_table: String,
    pub queue: QueueConfig,
    pub llm_retry: RetryConfig,
    pub auth_tokens: Vec<TokenGrant>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults
    /// for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`; an empty value counts as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let log_format = match var("LOG_FORMAT") {
            None => defaults.log_format,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(ConfigError::Invalid { name: "LOG_FORMAT", value }),
            },
        };

        let queue = QueueConfig {
            batch_size: parse_or(&var, "QUEUE_BATCH_SIZE", defaults.queue.batch_size)?,
            poll_interval: millis_or(&var, "QUEUE_POLL_INTERVAL_MS", defaults.queue.poll_interval)?,
            visibility_timeout: millis_or(
                &var,
                "QUEUE_VISIBILITY_TIMEOUT_MS",
                defaults.queue.visibility_timeout,
            )?,
            max_receive_count: parse_or(
                &var,
                "QUEUE_MAX_RECEIVE_COUNT",
                defaults.queue.max_receive_count,
            )?,
            parallel: flag_or(&var, "QUEUE_PARALLEL", defaults.queue.parallel)?,
            continue_on_error: flag_or(
                &var,
                "QUEUE_CONTINUE_ON_ERROR",
                defaults.queue.continue_on_error,
            )?,
            verbose: flag_or(&var, "QUEUE_VERBOSE", defaults.queue.verbose)?,
        };
        if queue.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "QUEUE_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        if queue.max_receive_count == 0 {
            return Err(ConfigError::Invalid {
                name: "QUEUE_MAX_RECEIVE_COUNT",
                value: "0".to_string(),
            });
        }

        let llm_retry = RetryConfig {
            max_attempts: parse_or(
                &var,
                "LLM_RETRY_MAX_ATTEMPTS",
                defaults.llm_retry.max_attempts,
            )?
            .max(1),
            delay: millis_or(&var, "LLM_RETRY_DELAY_MS", defaults.llm_retry.delay)?,
        };

        let auth_tokens = match var("AUTH_TOKENS") {
            None => Vec::new(),
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::parse::<TokenGrant>)
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PORT", defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: var("DATABASE_URL"),
            items_table: var("ITEMS_TABLE").unwrap_or(defaults.items_table),
            queue,
            llm_retry,
            auth_tokens,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The development identity authority built from `AUTH_TOKENS`.
    pub fn authority(&self) -> StaticTokenAuthority {
        self.auth_tokens
            .iter()
            .fold(StaticTokenAuthority::new(), |authority, grant| {
                let claims = VerifiedClaims::for_subject(&grant.principal_id);
                let claims = match &grant.key_id {
                    Some(key_id) => claims.with_key_id(key_id),
                    None => claims,
                };
                authority.with_token(&grant.token, claims)
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            items_table: "items".to_string(),
            queue: QueueConfig::default(),
            llm_retry: RetryConfig::default(),
            auth_tokens: Vec::new(),
        }
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn millis_or(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = parse_or(var, name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn flag_or(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}
