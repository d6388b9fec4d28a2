// ── Device id mapping ──
//
// Bidirectional map between current (project) device ids and the
// discovery subsystem's opaque device ids.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Maps {
    by_current: HashMap<i64, String>,
    by_external: HashMap<String, i64>,
}

#[derive(Debug, Default)]
pub struct DeviceIdMapper {
    maps: RwLock<Maps>,
}

impl DeviceIdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `current_id` <-> `external_id`, dropping any previous pairing
    /// of either side so the map stays one-to-one.
    pub fn add(&self, current_id: i64, external_id: impl Into<String>) {
        let external_id = external_id.into();
        let mut maps = self.write();
        if let Some(old_ext) = maps.by_current.remove(&current_id) {
            maps.by_external.remove(&old_ext);
        }
        if let Some(old_cur) = maps.by_external.remove(&external_id) {
            maps.by_current.remove(&old_cur);
        }
        maps.by_current.insert(current_id, external_id.clone());
        maps.by_external.insert(external_id, current_id);
    }

    pub fn external_id(&self, current_id: i64) -> Option<String> {
        self.read_with(|m| m.by_current.get(&current_id).cloned())
    }

    pub fn current_id(&self, external_id: &str) -> Option<i64> {
        self.read_with(|m| m.by_external.get(external_id).copied())
    }

    pub fn delete_by_current(&self, current_id: i64) {
        let mut maps = self.write();
        if let Some(ext) = maps.by_current.remove(&current_id) {
            maps.by_external.remove(&ext);
        }
    }

    pub fn delete_by_external(&self, external_id: &str) {
        let mut maps = self.write();
        if let Some(cur) = maps.by_external.remove(external_id) {
            maps.by_current.remove(&cur);
        }
    }

    pub fn clear(&self) {
        let mut maps = self.write();
        maps.by_current.clear();
        maps.by_external.clear();
    }

    pub fn len(&self) -> usize {
        self.read_with(|m| m.by_current.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_with<T>(&self, f: impl FnOnce(&Maps) -> T) -> T {
        f(&self.maps.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }
}
