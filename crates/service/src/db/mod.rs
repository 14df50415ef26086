//! Durable order storage in `PostgreSQL`.
//!
//! ## Tables
//!
//! - `orders` - Aggregate root, keyed by `order_uid`
//! - `deliveries` - One row per order
//! - `payments` - One row per order
//! - `items` - Order lines, ordered by `position`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/service/migrations/` and run via:
//! ```bash
//! cargo run -p orderflow-cli -- migrate
//! ```

pub mod orders;

use std::time::Duration;

use async_trait::async_trait;
use orderflow_core::Order;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use orders::OrderRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested order was not found.
    #[error("order not found")]
    NotFound,
}

impl RepositoryError {
    /// Whether this is the expected "no such order" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Durable save/read of the order aggregate.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist the order with its delivery, payment and items atomically.
    ///
    /// Saving an order whose `order_uid` already exists replaces it.
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Load one order. Returns [`RepositoryError::NotFound`] if it does not exist.
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, RepositoryError>;

    /// Load the `limit` most recently created orders, newest first.
    ///
    /// Returns an empty vector when there are none.
    async fn get_last_n_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
