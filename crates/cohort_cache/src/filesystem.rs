//! Filesystem-backed durable store.
//!
//! Layout: `{base_path}/{sha256(cache_name)}/{sha256(key)}.json`. Hashing
//! keeps arbitrary URLs and cache names filesystem-safe; each entry is one
//! JSON document written through a temp file and a rename so readers never
//! see a partial write.

use crate::{CacheEntry, CacheStore};
use cohort_error::{CacheError, CacheErrorKind, CohortResult};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Durable store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    /// Create a store, creating the base directory if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or is not writable;
    /// callers treat that as "durable storage unavailable".
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> CohortResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            CacheError::new(CacheErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        let metadata = std::fs::metadata(&base_path).map_err(|e| {
            CacheError::new(CacheErrorKind::Unavailable(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;
        if metadata.permissions().readonly() {
            return Err(CacheError::new(CacheErrorKind::Unavailable(format!(
                "{} is read-only",
                base_path.display()
            )))
            .into());
        }

        tracing::info!(path = %base_path.display(), "Opened filesystem cache store");
        Ok(Self { base_path })
    }

    fn hash(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cache_dir(&self, cache_name: &str) -> PathBuf {
        self.base_path.join(Self::hash(cache_name))
    }

    fn entry_path(&self, cache_name: &str, key: &str) -> PathBuf {
        self.cache_dir(cache_name)
            .join(format!("{}.json", Self::hash(key)))
    }
}

#[async_trait::async_trait]
impl CacheStore for FileSystemStore {
    #[tracing::instrument(skip(self))]
    async fn get(&self, cache_name: &str, key: &str) -> CohortResult<Option<CacheEntry>> {
        let path = self.entry_path(cache_name, key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::new(CacheErrorKind::EntryRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into());
            }
        };

        let entry = serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::new(CacheErrorKind::Corrupt(format!("{}: {}", path.display(), e)))
        })?;
        Ok(Some(entry))
    }

    #[tracing::instrument(skip(self, entry))]
    async fn put(&self, cache_name: &str, key: &str, entry: CacheEntry) -> CohortResult<()> {
        let dir = self.cache_dir(cache_name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            CacheError::new(CacheErrorKind::DirectoryCreation(format!(
                "{}: {}",
                dir.display(),
                e
            )))
        })?;

        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| CacheError::new(CacheErrorKind::Corrupt(e.to_string())))?;

        let path = self.entry_path(cache_name, key);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &bytes).await.map_err(|e| {
            CacheError::new(CacheErrorKind::EntryWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;

        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            CacheError::new(CacheErrorKind::EntryWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )))
        })?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored cache entry");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, cache_name: &str, key: &str) -> CohortResult<()> {
        let path = self.entry_path(cache_name, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::new(CacheErrorKind::Delete(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn clear(&self, cache_name: &str) -> CohortResult<()> {
        let dir = self.cache_dir(cache_name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::new(CacheErrorKind::Delete(format!(
                "{}: {}",
                dir.display(),
                e
            )))
            .into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn clear_all(&self) -> CohortResult<()> {
        let mut dirs = tokio::fs::read_dir(&self.base_path).await.map_err(|e| {
            CacheError::new(CacheErrorKind::Delete(format!(
                "{}: {}",
                self.base_path.display(),
                e
            )))
        })?;

        while let Some(dir) = dirs
            .next_entry()
            .await
            .map_err(|e| CacheError::new(CacheErrorKind::Delete(e.to_string())))?
        {
            tokio::fs::remove_dir_all(dir.path()).await.map_err(|e| {
                CacheError::new(CacheErrorKind::Delete(format!(
                    "{}: {}",
                    dir.path().display(),
                    e
                )))
            })?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
