// ── Per-link lock registry ──
//
// One async mutex per canonical link identity, created on first use.
// Entries are not removed by reconciliation; the registry is cleared
// when a session starts, so its size stays bounded by the topology.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `link_key`, created atomically if absent.
    pub fn get(&self, link_key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(link_key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.locks
                .entry(link_key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Forget the lock for a link that is permanently gone.
    ///
    /// Holders of an `Arc` obtained earlier keep a valid lock; a later
    /// `get` creates a fresh one.
    pub fn delete(&self, link_key: &str) {
        self.locks.remove(link_key);
    }

    pub fn clear(&self) {
        self.locks.clear();
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn same_key_yields_same_lock() {
        let registry = LockRegistry::new();
        let a = registry.get("10.0.0.1:1-10.0.0.2:1");
        let b = registry.get("10.0.0.1:1-10.0.0.2:1");
        let c = registry.get("10.0.0.1:2-10.0.0.2:2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_returns_one_instance() {
        let registry = Arc::new(LockRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get("k") })
            })
            .collect();
        let mut locks = Vec::new();
        for h in handles {
            locks.push(h.await.unwrap());
        }
        assert!(locks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lock_serializes_create_decisions() {
        let registry = Arc::new(LockRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));
        let exists = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                let exists = Arc::clone(&exists);
                tokio::spawn(async move {
                    let lock = registry.get("link");
                    let _guard = lock.lock().await;
                    if !exists.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        exists.store(true, Ordering::SeqCst);
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_and_clear() {
        let registry = LockRegistry::new();
        let before = registry.get("k");
        registry.delete("k");
        assert!(registry.is_empty());
        let after = registry.get("k");
        assert!(!Arc::ptr_eq(&before, &after));
        registry.clear();
        assert!(registry.is_empty());
    }
}
