//! In-process order cache.
//!
//! A fixed-capacity LRU map from `order_uid` to a shared order snapshot. All
//! operations take one mutex; each is O(1) except [`OrderCache::load_batch`],
//! which is O(capacity).
//!
//! Entries are never revalidated against the store. Orders only change when
//! a message with the same `order_uid` is reprocessed, and that path writes
//! the cache after persisting.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use orderflow_core::Order;

/// Concurrent bounded LRU cache of orders keyed by `order_uid`.
pub struct OrderCache {
    entries: Mutex<LruCache<String, Arc<Order>>>,
}

impl OrderCache {
    /// Create an empty cache holding at most `capacity` orders.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<Order>>> {
        // Every critical section leaves the map consistent, so a panic while
        // holding the lock does not invalidate it.
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("order cache mutex was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Look up an order and mark it most recently used.
    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.lock().get(order_uid).cloned()
    }

    /// Insert or replace an order and mark it most recently used.
    ///
    /// Evicts the least recently used entry when a new key arrives at capacity.
    pub fn set(&self, order: Arc<Order>) {
        self.lock().put(order.order_uid.clone(), order);
    }

    /// Replace the whole cache with `orders`.
    ///
    /// The first element becomes the most recently used. Only the first
    /// `capacity` distinct uids are kept; repeats keep their first position.
    pub fn load_batch<I>(&self, orders: I)
    where
        I: IntoIterator<Item = Arc<Order>>,
    {
        let mut entries = self.lock();
        entries.clear();

        let capacity = entries.cap().get();
        let mut seen = HashSet::new();
        let batch: Vec<Arc<Order>> = orders
            .into_iter()
            .filter(|order| seen.insert(order.order_uid.clone()))
            .take(capacity)
            .collect();

        for order in batch.into_iter().rev() {
            entries.put(order.order_uid.clone(), order);
        }
    }

    /// Whether `order_uid` is cached. Does not change recency.
    pub fn contains(&self, order_uid: &str) -> bool {
        self.lock().contains(order_uid)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> NonZeroUsize {
        self.lock().cap()
    }
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock();
        f.debug_struct("OrderCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}
