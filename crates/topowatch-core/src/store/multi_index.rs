// ── Multi-index cache ──
//
// Primary map plus named secondary indices (`V -> String`). Indices
// live under the same lock as the primary map, so every index entry
// always points at exactly one live primary entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type IndexFn<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;

struct Inner<K, V> {
    data: HashMap<K, V>,
    index_fns: HashMap<String, IndexFn<V>>,
    /// Index name -> index key -> primary key.
    indices: HashMap<String, HashMap<String, K>>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn unindex(&mut self, key: &K, value: &V) {
        for (name, index_fn) in &self.index_fns {
            let Some(index) = self.indices.get_mut(name) else {
                continue;
            };
            let index_key = index_fn(value);
            // Another entry may have claimed the same index key since.
            if index.get(&index_key) == Some(key) {
                index.remove(&index_key);
            }
        }
    }

    fn index(&mut self, key: &K, value: &V) {
        for (name, index_fn) in &self.index_fns {
            let index_key = index_fn(value);
            // Unique index: a newer holder of the same index key wins.
            self.indices
                .entry(name.clone())
                .or_default()
                .insert(index_key, key.clone());
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(old) = self.data.remove(&key) {
            self.unindex(&key, &old);
        }
        self.index(&key, &value);
        self.data.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.data.remove(key)?;
        self.unindex(key, &value);
        Some(value)
    }
}

/// Keyed cache with transactional secondary indices.
pub struct MultiIndexCache<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> MultiIndexCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                data: HashMap::new(),
                index_fns: HashMap::new(),
                indices: HashMap::new(),
            }),
        }
    }

    /// Register (or replace) a named index and build it over current entries.
    pub fn add_index(
        &self,
        name: impl Into<String>,
        index_fn: impl Fn(&V) -> String + Send + Sync + 'static,
    ) {
        let name = name.into();
        let index_fn: IndexFn<V> = Arc::new(index_fn);
        let mut inner = self.write();
        let index: HashMap<String, K> = inner
            .data
            .iter()
            .map(|(k, v)| (index_fn(v), k.clone()))
            .collect();
        inner.indices.insert(name.clone(), index);
        inner.index_fns.insert(name, index_fn);
    }

    pub fn delete_index(&self, name: &str) {
        let mut inner = self.write();
        inner.index_fns.remove(name);
        inner.indices.remove(name);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.read().data.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().data.contains_key(key)
    }

    pub fn get_by_index(&self, name: &str, index_key: &str) -> Option<V> {
        let inner = self.read();
        let primary = inner.indices.get(name)?.get(index_key)?;
        inner.data.get(primary).cloned()
    }

    /// Primary key behind an index entry.
    pub fn key_by_index(&self, name: &str, index_key: &str) -> Option<K> {
        self.read().indices.get(name)?.get(index_key).cloned()
    }

    /// Isolated copy of the primary map.
    pub fn get_all(&self) -> HashMap<K, V> {
        self.read().data.clone()
    }

    /// Isolated copy keyed by index key instead of primary key.
    pub fn get_all_by_index(&self, name: &str) -> HashMap<String, V> {
        let inner = self.read();
        let Some(index) = inner.indices.get(name) else {
            return HashMap::new();
        };
        index
            .iter()
            .filter_map(|(ik, pk)| inner.data.get(pk).map(|v| (ik.clone(), v.clone())))
            .collect()
    }

    pub fn set(&self, key: K, value: V) {
        self.write().insert(key, value);
    }

    pub fn set_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let mut inner = self.write();
        for (key, value) in entries {
            inner.insert(key, value);
        }
    }

    pub fn delete(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    pub fn delete_by_index(&self, name: &str, index_key: &str) -> Option<V> {
        let mut inner = self.write();
        let primary = inner.indices.get(name)?.get(index_key)?.clone();
        inner.remove(&primary)
    }

    /// Drop every entry; registered index functions stay.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.data.clear();
        for index in inner.indices.values_mut() {
            index.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().data.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<K, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for MultiIndexCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: i64,
        name: String,
    }

    fn entry(id: i64, name: &str) -> Entry {
        Entry {
            id,
            name: name.into(),
        }
    }

    fn cache() -> MultiIndexCache<i64, Entry> {
        let cache = MultiIndexCache::new();
        cache.add_index("name", |e: &Entry| e.name.clone());
        cache
    }

    #[test]
    fn index_tracks_set_and_delete() {
        let cache = cache();
        cache.set(1, entry(1, "alpha"));
        assert_eq!(cache.get_by_index("name", "alpha"), Some(entry(1, "alpha")));

        cache.delete(&1);
        assert_eq!(cache.get_by_index("name", "alpha"), None);
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn overwrite_drops_stale_index_key() {
        let cache = cache();
        cache.set(1, entry(1, "alpha"));
        cache.set(1, entry(1, "beta"));

        assert_eq!(cache.get_by_index("name", "alpha"), None);
        assert_eq!(cache.get_by_index("name", "beta"), Some(entry(1, "beta")));
        assert_eq!(cache.get_all_by_index("name").len(), 1);
    }

    #[test]
    fn add_index_covers_existing_entries() {
        let cache: MultiIndexCache<i64, Entry> = MultiIndexCache::new();
        cache.set_all([(1, entry(1, "a")), (2, entry(2, "b"))]);
        cache.add_index("id", |e: &Entry| e.id.to_string());

        assert_eq!(cache.get_by_index("id", "2"), Some(entry(2, "b")));
        assert_eq!(cache.key_by_index("id", "1"), Some(1));
    }

    #[test]
    fn delete_by_index_removes_primary_and_other_indices() {
        let cache = cache();
        cache.add_index("id", |e: &Entry| e.id.to_string());
        cache.set(7, entry(7, "seven"));

        assert_eq!(cache.delete_by_index("name", "seven"), Some(entry(7, "seven")));
        assert!(cache.is_empty());
        assert_eq!(cache.get_by_index("id", "7"), None);
        assert_eq!(cache.delete_by_index("name", "seven"), None);
    }

    #[test]
    fn deleting_old_holder_keeps_new_holder_indexed() {
        let cache = cache();
        cache.set(1, entry(1, "shared"));
        cache.set(2, entry(2, "shared"));
        cache.delete(&1);
        assert_eq!(cache.get_by_index("name", "shared"), Some(entry(2, "shared")));
    }

    #[test]
    fn get_all_is_isolated_and_clear_keeps_indices_registered() {
        let cache = cache();
        cache.set(1, entry(1, "a"));
        let mut copy = cache.get_all();
        copy.get_mut(&1).unwrap().name = "mutated".into();
        assert_eq!(cache.get(&1), Some(entry(1, "a")));

        cache.clear();
        assert!(cache.get_all_by_index("name").is_empty());
        cache.set(3, entry(3, "c"));
        assert_eq!(cache.get_by_index("name", "c"), Some(entry(3, "c")));
    }

    #[test]
    fn delete_index_forgets_lookups() {
        let cache = cache();
        cache.set(1, entry(1, "a"));
        cache.delete_index("name");
        assert_eq!(cache.get_by_index("name", "a"), None);
        assert_eq!(cache.get(&1), Some(entry(1, "a")));
    }
}
