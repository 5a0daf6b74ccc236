//! Expiring response cache for the Cohort request client.
//!
//! One interface ([`CacheStore`]), two implementations ([`MemoryStore`] and
//! [`FileSystemStore`]), selected once when the [`ResponseCache`] is built.
//! Expired entries are removed lazily on the read that finds them.

#![warn(missing_docs)]

mod cache;
mod entry;
mod filesystem;
mod memory;
mod store;

pub use cache::{AddOptions, ResponseCache, UNCACHEABLE_STATUSES};
pub use entry::{CacheEntry, CachedResponse};
pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;
pub use store::CacheStore;
