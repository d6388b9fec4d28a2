// ── Keyed snapshot cache ──
//
// A `HashMap` behind a read-write lock. Reads hand out clones, so a
// caller can never observe or cause a torn entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Concurrency-safe key-value store with copy-in/copy-out semantics.
#[derive(Debug)]
pub struct KeyedCache<K, V> {
    data: RwLock<HashMap<K, V>>,
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().contains_key(key)
    }

    pub fn set(&self, key: K, value: V) {
        self.write().insert(key, value);
    }

    /// Remove and return the entry for `key`.
    pub fn delete(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Isolated copy of every entry.
    pub fn get_all(&self) -> HashMap<K, V> {
        self.read().clone()
    }

    pub fn values(&self) -> Vec<V> {
        self.read().values().cloned().collect()
    }

    /// Merge `entries` in under a single write lock.
    pub fn set_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let mut guard = self.write();
        guard.extend(entries);
    }

    /// Replace the whole content under a single write lock.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let fresh: HashMap<K, V> = entries.into_iter().collect();
        *self.write() = fresh;
    }

    /// First value matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&V) -> bool) -> Option<V> {
        self.read().values().find(|v| predicate(v)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written map:
    // every mutation is a single `HashMap` call.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
