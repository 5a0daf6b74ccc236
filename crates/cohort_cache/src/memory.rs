//! In-memory store, also the fallback when no durable storage is available.

use crate::{CacheEntry, CacheStore};
use cohort_error::CohortResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Nested `cache name -> key -> entry` map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    caches: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all caches.
    pub async fn len(&self) -> usize {
        self.caches.read().await.values().map(HashMap::len).sum()
    }

    /// Whether no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, cache_name: &str, key: &str) -> CohortResult<Option<CacheEntry>> {
        Ok(self
            .caches
            .read()
            .await
            .get(cache_name)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    async fn put(&self, cache_name: &str, key: &str, entry: CacheEntry) -> CohortResult<()> {
        self.caches
            .write()
            .await
            .entry(cache_name.to_string())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, cache_name: &str, key: &str) -> CohortResult<()> {
        if let Some(cache) = self.caches.write().await.get_mut(cache_name) {
            cache.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, cache_name: &str) -> CohortResult<()> {
        self.caches.write().await.remove(cache_name);
        Ok(())
    }

    async fn clear_all(&self) -> CohortResult<()> {
        self.caches.write().await.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
