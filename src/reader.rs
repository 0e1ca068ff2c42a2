use std::sync::Arc;

use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::storage::{OrderRepository, StoreError};

/// Read-through lookup used by the HTTP layer: cache first, then the store,
/// caching whatever the store returns.
pub struct OrderReader {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderRepository>,
    metrics: Arc<Metrics>,
}

impl OrderReader {
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderRepository>, metrics: Arc<Metrics>) -> Self {
        Self { cache, store, metrics }
    }

    pub async fn lookup(&self, order_uid: &str) -> Result<Arc<Order>, StoreError> {
        if let Some(order) = self.cache.get(order_uid) {
            self.metrics.record_lookup("cache");
            return Ok(order);
        }

        match self.store.get(order_uid).await {
            Ok(order) => {
                self.metrics.record_lookup("store");
                let order = self.cache.set(order);
                self.metrics.set_cache_entries(self.cache.len());
                tracing::debug!(order_uid = %order_uid, "Cache filled from store");
                Ok(order)
            }
            Err(e) => {
                self.metrics.record_lookup("miss");
                Err(e)
            }
        }
    }

    /// Load the `limit` newest orders into the cache. Returns how many were loaded.
    pub async fn warm_up(&self, limit: i64) -> Result<usize, StoreError> {
        let orders = self.store.recent_orders(limit).await?;
        let loaded = orders.len();
        for order in orders {
            self.cache.set(order);
        }
        self.metrics.set_cache_entries(self.cache.len());
        Ok(loaded)
    }
}
