//! CLI subcommands.

pub mod migrate;
pub mod publish;

use orderflow_service::config::ConfigError;
use orderflow_service::ingest::BrokerError;
use thiserror::Error;

/// Errors from any subcommand.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Not an order: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Order rejected: {0}")]
    Invalid(#[from] orderflow_core::ValidationError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}
