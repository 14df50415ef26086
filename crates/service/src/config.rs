//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORDERFLOW_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ORDERFLOW_HOST` - Bind address (default: 127.0.0.1)
//! - `ORDERFLOW_PORT` - Listen port (default: 8081)
//! - `CACHE_CAPACITY` - Maximum cached orders, at least 1 (default: 1000)
//! - `CACHE_PRELOAD_LIMIT` - Orders loaded into the cache on start (default: 100)
//! - `NATS_URL` - Broker URL (default: `nats://localhost:4222`)
//! - `NATS_USER` / `NATS_PASSWORD` - Broker credentials
//! - `ORDERS_STREAM` - Ingestion stream (default: ORDERS)
//! - `ORDERS_SUBJECT` - Ingestion subject (default: orders.created)
//! - `ORDERS_CONSUMER` - Durable consumer name (default: order-service)
//! - `DEAD_LETTER_STREAM` - Quarantine stream (default: `ORDERS_DLQ`)
//! - `DEAD_LETTER_SUBJECT` - Quarantine subject (default: orders.dlq)
//! - `DEAD_LETTER_TIMEOUT_SECS` - Timeout around a dead-letter publish, 0 disables (default: 5)
//! - `RETRY_BACKOFF_MS` - Pause before refetching an uncommitted message (default: 1000)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the HTTP server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Order cache sizing
    pub cache: CacheConfig,
    /// Message broker settings
    pub broker: BrokerConfig,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Order cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: NonZeroUsize,
    pub preload_limit: usize,
}

/// Message broker (NATS `JetStream`) settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Stream holding ingested orders.
    pub stream: String,
    /// Subject orders are published on (the ingestion topic).
    pub subject: String,
    /// Durable consumer name (the consumer group).
    pub consumer: String,
    pub dead_letter_stream: String,
    pub dead_letter_subject: String,
    /// `None` sends without a deadline.
    pub dead_letter_timeout: Option<Duration>,
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("stream", &self.stream)
            .field("subject", &self.subject)
            .field("consumer", &self.consumer)
            .field("dead_letter_stream", &self.dead_letter_stream)
            .field("dead_letter_subject", &self.dead_letter_subject)
            .field("dead_letter_timeout", &self.dead_letter_timeout)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env
            .optional("ORDERFLOW_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("ORDERFLOW_DATABASE_URL".to_string()))?;

        let capacity: usize = env.parse_or("CACHE_CAPACITY", 1000)?;
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            ConfigError::InvalidEnvVar("CACHE_CAPACITY".to_string(), "must be at least 1".to_string())
        })?;

        Ok(Self {
            database_url,
            host: env.parse_or("ORDERFLOW_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: env.parse_or("ORDERFLOW_PORT", 8081)?,
            cache: CacheConfig {
                capacity,
                preload_limit: env.parse_or("CACHE_PRELOAD_LIMIT", 100)?,
            },
            broker: BrokerConfig::from_lookup(&lookup)?,
            log_format: env.parse_or("LOG_FORMAT", LogFormat::Text)?,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BrokerConfig {
    /// Load only the broker settings, for tools that never touch the database.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build broker settings from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let dead_letter_timeout_secs: u64 = env.parse_or("DEAD_LETTER_TIMEOUT_SECS", 5)?;

        Ok(Self {
            url: env.or_default("NATS_URL", "nats://localhost:4222"),
            user: env.optional("NATS_USER"),
            password: env.optional("NATS_PASSWORD").map(SecretString::from),
            stream: env.or_default("ORDERS_STREAM", "ORDERS"),
            subject: env.or_default("ORDERS_SUBJECT", "orders.created"),
            consumer: env.or_default("ORDERS_CONSUMER", "order-service"),
            dead_letter_stream: env.or_default("DEAD_LETTER_STREAM", "ORDERS_DLQ"),
            dead_letter_subject: env.or_default("DEAD_LETTER_SUBJECT", "orders.dlq"),
            dead_letter_timeout: (dead_letter_timeout_secs > 0)
                .then(|| Duration::from_secs(dead_letter_timeout_secs)),
            retry_backoff: Duration::from_millis(env.parse_or("RETRY_BACKOFF_MS", 1000)?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional variable; blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}
