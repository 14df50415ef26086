//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the database pool and the order service.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: PgPool,
    orders: OrderService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `pool` - `PostgreSQL` connection pool, used for readiness checks
    /// * `orders` - Order service shared with the ingestion consumer
    #[must_use]
    pub fn new(pool: PgPool, orders: OrderService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { pool, orders }),
        }
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }
}
