//! In-memory legacy location.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{LegacyStore, StoreError};
use crate::secret::Secret;

/// In-memory stand-in for a legacy location, for tests and embedders that
/// hand over credentials they loaded themselves.
pub struct MemoryLegacyStore {
    data: RwLock<HashMap<String, Secret>>,
}

impl MemoryLegacyStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store seeded with `(key, value)` pairs.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Secret::new(v)))
            .collect();
        Self {
            data: RwLock::new(data),
        }
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryLegacyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLegacyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLegacyStore")
            .field("keys_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl LegacyStore for MemoryLegacyStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_legacy_get() {
        let store = MemoryLegacyStore::with_entries([("accessToken", "a1")]);

        let found = store.get("accessToken").await.unwrap();
        assert_eq!(found.unwrap().expose(), "a1");
        assert!(store.get("refreshToken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_legacy_remove_is_idempotent() {
        let store = MemoryLegacyStore::with_entries([("accessToken", "a1")]);

        store.remove("accessToken").await.unwrap();
        store.remove("accessToken").await.unwrap();

        assert!(store.is_empty());
    }
}
