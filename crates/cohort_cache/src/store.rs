//! Storage strategy behind the response cache.

use crate::CacheEntry;
use cohort_error::CohortResult;

/// Key/value blob store scoped by cache name.
///
/// Implementations must support deleting a whole named cache; the response
/// cache uses that on logout and server switch.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry, expired or not.
    async fn get(&self, cache_name: &str, key: &str) -> CohortResult<Option<CacheEntry>>;

    /// Write an entry, replacing any previous one.
    async fn put(&self, cache_name: &str, key: &str, entry: CacheEntry) -> CohortResult<()>;

    /// Remove one entry. Missing entries are not an error.
    async fn delete(&self, cache_name: &str, key: &str) -> CohortResult<()>;

    /// Remove every entry of one named cache.
    async fn clear(&self, cache_name: &str) -> CohortResult<()>;

    /// Remove every entry of every cache.
    async fn clear_all(&self) -> CohortResult<()>;

    /// Backend name for logging (e.g. "memory", "filesystem").
    fn backend_name(&self) -> &'static str;
}
