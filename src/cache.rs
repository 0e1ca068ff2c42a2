use dashmap::DashMap;
use std::sync::Arc;

use crate::models::Order;

// ============================================================================
// Order Cache
// ============================================================================
//
// In-memory mirror of orders seen by this process, keyed by `order_uid`.
// Values are immutable `Arc<Order>` snapshots: a writer swaps the whole
// aggregate in one map operation, so a concurrent reader gets either the old
// snapshot or the new one, never a mix.
//
// No eviction: the cache only ever holds what the store already holds.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct OrderCache {
    entries: DashMap<String, Arc<Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.entries.get(order_uid).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or overwrite the entry for `order.order_uid`.
    pub fn set(&self, order: Order) -> Arc<Order> {
        let order = Arc::new(order);
        self.entries.insert(order.order_uid.clone(), Arc::clone(&order));
        order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_order;

    #[test]
    fn test_get_missing_returns_none() {
        let cache = OrderCache::new();
        assert!(cache.get("nope").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites_by_uid() {
        let cache = OrderCache::new();
        cache.set(sample_order("o1"));

        let mut newer = sample_order("o1");
        newer.track_number = "NEWTRACK".to_string();
        cache.set(newer.clone());

        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get("o1").unwrap(), newer);
    }

    #[test]
    fn test_readers_never_observe_partial_writes() {
        fn versioned(version: i64) -> Order {
            let mut order = sample_order("hot");
            order.payment.amount = version;
            order.items[0].price = version;
            order
        }

        let cache = Arc::new(OrderCache::new());
        cache.set(versioned(0));

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for version in 1..2_000 {
                    cache.set(versioned(version));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let order = cache.get("hot").expect("entry present");
                        assert_eq!(order.payment.amount, order.items[0].price);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
