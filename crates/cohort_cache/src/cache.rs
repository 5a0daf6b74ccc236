//! Response cache front.

use crate::{CacheEntry, CacheStore, CachedResponse, FileSystemStore, MemoryStore};
use cohort_core::CacheConfig;
use cohort_error::CohortResult;
use std::sync::Arc;

/// Statuses that are never cached: transport abort, 401 and 403.
pub const UNCACHEABLE_STATUSES: [u16; 3] = [0, 401, 403];

/// Name used inside the in-memory store for unnamed entries.
const ANONYMOUS_CACHE: &str = "";

/// Where and how long to store a response.
#[derive(Debug, Clone, Default)]
pub struct AddOptions<'a> {
    /// Durable cache name; `None` stores in memory only
    pub cache_name: Option<&'a str>,
    /// Lifetime of the entry
    pub expiration_seconds: Option<u64>,
    /// Also store non-2xx responses
    pub cache_errors: bool,
}

/// Expiring cache of request results.
///
/// Named lookups go to the durable store selected at construction; unnamed
/// lookups go to a process-local map. When durable storage is unavailable a
/// second memory store takes its place, so callers see the same behaviour
/// minus persistence across restarts.
///
/// # Example
///
/// ```
/// use cohort_cache::{AddOptions, CachedResponse, ResponseCache};
/// use serde_json::json;
///
/// # async fn example() {
/// let cache = ResponseCache::in_memory();
/// let options = AddOptions { cache_name: Some("probes"), expiration_seconds: Some(60), cache_errors: false };
/// cache.add("https://example.org/fhir/metadata", CachedResponse::new(200, json!({})), &options).await;
/// assert!(cache.get("https://example.org/fhir/metadata", Some("probes")).await.is_some());
/// # }
/// ```
pub struct ResponseCache {
    durable: Arc<dyn CacheStore>,
    memory: MemoryStore,
}

impl ResponseCache {
    /// Cache over an explicit durable store.
    pub fn new(durable: Arc<dyn CacheStore>) -> Self {
        tracing::debug!(backend = durable.backend_name(), "Creating response cache");
        Self {
            durable,
            memory: MemoryStore::new(),
        }
    }

    /// Cache without durable storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Select the store once, from configuration and what the environment offers.
    #[tracing::instrument(skip(config))]
    pub fn from_config(config: &CacheConfig) -> Self {
        if !*config.durable() {
            return Self::in_memory();
        }
        let Some(directory) = config.resolved_directory() else {
            tracing::warn!("No cache directory available, using in-memory cache");
            return Self::in_memory();
        };
        match FileSystemStore::new(&directory) {
            Ok(store) => Self::new(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Durable cache unavailable, using in-memory cache");
                Self::in_memory()
            }
        }
    }

    /// Name of the durable backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.durable.backend_name()
    }

    fn store_for(&self, cache_name: Option<&str>) -> (&dyn CacheStore, String) {
        match cache_name {
            Some(name) => (self.durable.as_ref(), name.to_string()),
            None => (&self.memory as &dyn CacheStore, ANONYMOUS_CACHE.to_string()),
        }
    }

    /// Look up a live entry; an expired one is deleted and reported as a miss.
    ///
    /// Store failures are logged and read as misses.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &str, cache_name: Option<&str>) -> Option<CacheEntry> {
        let (store, name) = self.store_for(cache_name);

        let entry = match store.get(&name, key).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed");
                return None;
            }
        };

        if entry.is_expired() {
            tracing::debug!("Cache entry expired, removing");
            if let Err(e) = store.delete(&name, key).await {
                tracing::warn!(error = %e, "Failed to delete expired cache entry");
            }
            return None;
        }

        tracing::debug!(status = entry.payload().status(), "Cache hit");
        Some(entry)
    }

    /// Store a response if its status is cacheable. Returns whether it was stored.
    ///
    /// Aborts, 401 and 403 are never stored. Other non-2xx responses are
    /// stored only with `cache_errors`.
    #[tracing::instrument(skip(self, response, options), fields(status = response.status()))]
    pub async fn add(&self, key: &str, response: CachedResponse, options: &AddOptions<'_>) -> bool {
        let status = *response.status();
        if UNCACHEABLE_STATUSES.contains(&status) {
            tracing::debug!("Status is never cached");
            return false;
        }
        if !response.is_success() && !options.cache_errors {
            tracing::debug!("Error response not cached");
            return false;
        }

        let (store, name) = self.store_for(options.cache_name);
        let entry = CacheEntry::new(response, options.expiration_seconds);
        match store.put(&name, key, entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Drop one named cache.
    #[tracing::instrument(skip(self))]
    pub async fn clear_by_name(&self, cache_name: &str) -> CohortResult<()> {
        self.durable.clear(cache_name).await?;
        tracing::info!(cache_name, "Cleared cache");
        Ok(())
    }

    /// Drop everything.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) -> CohortResult<()> {
        self.durable.clear_all().await?;
        self.memory.clear_all().await?;
        tracing::info!("Cleared all caches");
        Ok(())
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("durable", &self.durable.backend_name())
            .finish()
    }
}
