//! In-memory store for tests and ephemeral sessions.

use super::{KeyValueStore, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Volatile [`KeyValueStore`]. Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_and_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set_raw("a", "1".into()).unwrap();
        store.set_raw("b", "2".into()).unwrap();
        assert_eq!(store.get_raw("a").as_deref(), Some("1"));
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get_raw("a"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set_raw("k", "v".into()).unwrap();
        assert_eq!(b.get_raw("k").as_deref(), Some("v"));
    }
}
