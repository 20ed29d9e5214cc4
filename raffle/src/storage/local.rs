//! File-backed local cache: one JSON document per key in a directory.

use raffle_core::cache::{CacheError, CacheFuture, LocalCache};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Local cache writing `{dir}/{key}.json`
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) the cache directory
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::Io(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CacheError::Io(format!("Invalid cache key: {key}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalCache for FileCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| CacheError::Serialization(format!("{key}: {e}"))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(CacheError::Io(format!("{}: {e}", path.display()))),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: serde_json::Value) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            let bytes = serde_json::to_vec_pretty(&value)
                .map_err(|e| CacheError::Serialization(format!("{key}: {e}")))?;

            // Readers never observe a partially written document.
            let staging = path.with_extension("json.tmp");
            tokio::fs::write(&staging, bytes)
                .await
                .map_err(|e| CacheError::Io(format!("{}: {e}", staging.display())))?;
            tokio::fs::rename(&staging, &path)
                .await
                .map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CacheError::Io(format!("{}: {e}", path.display()))),
            }
        })
    }

    fn clear(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&self.dir)
                .await
                .map_err(|e| CacheError::Io(format!("{}: {e}", self.dir.display())))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| CacheError::Io(e.to_string()))?
            {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    tokio::fs::remove_file(&path)
                        .await
                        .map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))?;
                }
            }
            tracing::debug!(dir = %self.dir.display(), "Cleared local cache");
            Ok(())
        })
    }
}
