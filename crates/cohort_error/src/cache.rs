//! Response cache error types.

/// Kinds of cache store errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CacheErrorKind {
    /// Failed to create the cache directory
    #[display("Failed to create cache directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to write a cache entry
    #[display("Failed to write cache entry: {}", _0)]
    EntryWrite(String),
    /// Failed to read a cache entry
    #[display("Failed to read cache entry: {}", _0)]
    EntryRead(String),
    /// Failed to delete a cache entry or cache
    #[display("Failed to delete cache data: {}", _0)]
    Delete(String),
    /// Stored entry could not be (de)serialized
    #[display("Corrupt cache entry: {}", _0)]
    Corrupt(String),
    /// Durable storage is not available in this environment
    #[display("Cache storage unavailable: {}", _0)]
    Unavailable(String),
}

/// Cache error with location tracking.
///
/// # Examples
///
/// ```
/// use cohort_error::{CacheError, CacheErrorKind};
///
/// let err = CacheError::new(CacheErrorKind::Unavailable("read-only filesystem".to_string()));
/// assert!(format!("{}", err).contains("unavailable"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Cache Error: {} at line {} in {}", kind, line, file)]
pub struct CacheError {
    /// The kind of error that occurred
    pub kind: CacheErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CacheError {
    /// Create a new cache error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CacheErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
