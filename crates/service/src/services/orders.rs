//! Cache-aside order service.
//!
//! Writes persist first and populate the cache only on success. Reads hit
//! the cache and fall back to the store on a miss, filling the cache with
//! what they found. Misses at the store are not cached.

use std::sync::Arc;

use chrono::SubsecRound;
use orderflow_core::Order;
use tracing::instrument;

use crate::cache::OrderCache;
use crate::db::{OrderStore, RepositoryError};

/// Coordinates the order store and the in-process cache.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self { store, cache }
    }

    #[must_use]
    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    /// Persist an accepted order, then cache it.
    ///
    /// `date_created` is truncated to microseconds first, the precision the
    /// store keeps, so the cached copy matches what a later read returns.
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged. The cache is not touched.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    pub async fn process_new_order(&self, mut order: Order) -> Result<(), RepositoryError> {
        order.date_created = order.date_created.trunc_subsecs(6);
        self.store.save_order(&order).await?;
        self.cache.set(Arc::new(order));
        Ok(())
    }

    /// Look up an order, reading through to the store on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the store has no such order,
    /// or the store error if the read failed.
    #[instrument(skip(self))]
    pub async fn get_order_by_uid(&self, order_uid: &str) -> Result<Arc<Order>, RepositoryError> {
        if let Some(order) = self.cache.get(order_uid) {
            tracing::debug!("cache hit");
            return Ok(order);
        }

        let order = Arc::new(self.store.get_order_by_uid(order_uid).await?);
        self.cache.set(Arc::clone(&order));
        tracing::debug!("cache filled from store");
        Ok(order)
    }

    /// Replace the cache contents with the `limit` newest orders.
    ///
    /// Returns how many orders the cache now holds.
    ///
    /// # Errors
    ///
    /// Returns the store error; the cache is left as it was.
    #[instrument(skip(self))]
    pub async fn preload_cache(&self, limit: usize) -> Result<usize, RepositoryError> {
        let orders = self.store.get_last_n_orders(limit).await?;
        self.cache.load_batch(orders.into_iter().map(Arc::new));

        let loaded = self.cache.len();
        tracing::info!(loaded, "order cache preloaded");
        Ok(loaded)
    }
}
