//! Per-order exclusive locks.
//!
//! Every mutation of one purchase order runs under that order's lock, from
//! loading the stream until the last event (including stock postings) is
//! appended. Orders never share a lock. An entry lives only while some caller
//! holds or awaits it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use factoryerp_core::{AggregateId, TenantId};

#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: Mutex<HashMap<(TenantId, AggregateId), Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, tenant_id: TenantId, order_id: AggregateId) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        map.entry((tenant_id, order_id)).or_default().clone()
    }

    /// Drop our handle; the entry goes once nobody else holds it.
    ///
    /// Handles are only cloned under the map lock, so a count of one seen under
    /// that lock cannot grow.
    fn release(&self, tenant_id: TenantId, order_id: AggregateId, lock: Arc<Mutex<()>>) {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        drop(lock);
        let key = (tenant_id, order_id);
        if map.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(&key);
        }
    }

    /// Run `f` while holding the lock for `(tenant_id, order_id)`.
    pub fn with_lock<T>(
        &self,
        tenant_id: TenantId,
        order_id: AggregateId,
        f: impl FnOnce() -> T,
    ) -> T {
        let lock = self.handle(tenant_id, order_id);
        let result = {
            // Poisoning is ignored: order state lives in the event store, not here.
            let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
            f()
        };
        self.release(tenant_id, order_id, lock);
        result
    }

    /// Number of orders currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_order_is_serialized() {
        let locks = Arc::new(OrderLocks::new());
        let (tenant, order) = (TenantId::new(), AggregateId::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (locks, inside, max_inside) =
                    (locks.clone(), inside.clone(), max_inside.clone());
                thread::spawn(move || {
                    locks.with_lock(tenant, order, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_orders_do_not_contend() {
        let locks = OrderLocks::new();
        let tenant = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());

        let nested = locks.with_lock(tenant, a, || locks.with_lock(tenant, b, || locks.len()));
        assert_eq!(nested, 2);
        assert!(locks.is_empty());
    }

    #[test]
    fn entries_are_released_after_use() {
        let locks = OrderLocks::new();
        let tenant = TenantId::new();
        for _ in 0..100 {
            locks.with_lock(tenant, AggregateId::new(), || ());
        }
        assert!(locks.is_empty());

        let order = AggregateId::new();
        locks.with_lock(tenant, order, || assert_eq!(locks.len(), 1));
        assert_eq!(locks.len(), 0);
    }
}
