//! Content-addressable flat-file cache for media descriptions.
//!
//! The [`FileCache`] stores one plain-text file per [`CacheKey`] under a
//! single directory: `<dir>/<key>.txt`. There is no index and no expiry.
//!
//! **Access rules:**
//! - One pipeline run owns the directory; there is no locking, so concurrent
//!   runs sharing a directory may interleave writes.
//! - Keys are URL fingerprints, so a URL whose target changes keeps
//!   returning the stored text.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use mediaqa_shared::{CacheEntry, CacheKey, MediaQaError, Result};

/// Extension of cache payload files.
const ENTRY_EXTENSION: &str = "txt";

/// Flat-file cache handle.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| MediaQaError::io(dir, e))?;

        debug!(dir = %dir.display(), "cache opened");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Root directory of this cache.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the payload for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Read the entry for `key`, or `None` if it was never written.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MediaQaError::io(&path, e)),
        };

        let text = String::from_utf8(bytes).map_err(|e| {
            MediaQaError::Cache(format!("{} is not valid UTF-8: {e}", path.display()))
        })?;

        let created_at = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(CacheEntry {
            key: key.clone(),
            text,
            created_at,
        }))
    }

    /// Persist `text` under `key`, silently replacing any previous payload.
    pub async fn put(&self, key: &CacheKey, text: &str) -> Result<CacheEntry> {
        let path = self.path_for(key);
        tokio::fs::write(&path, text.as_bytes())
            .await
            .map_err(|e| MediaQaError::io(&path, e))?;

        debug!(%key, len = text.len(), "cache entry written");
        Ok(CacheEntry {
            key: key.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Number of entries currently on disk.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entry_paths().await?.len())
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete every entry file. Other files in the directory are left alone.
    /// Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let paths = self.entry_paths().await?;
        for path in &paths {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| MediaQaError::io(path, e))?;
        }
        debug!(removed = paths.len(), "cache cleared");
        Ok(paths.len())
    }

    /// Paths of files that look like cache entries (`<64 hex chars>.txt`).
    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| MediaQaError::io(&self.dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MediaQaError::io(&self.dir, e))?
        {
            let path = entry.path();
            if is_entry_file(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn is_entry_file(path: &Path) -> bool {
    let has_ext = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION);
    let stem_is_key = path.file_stem().and_then(|s| s.to_str()).is_some_and(|s| {
        s.len() == CacheKey::LEN && s.chars().all(|c| c.is_ascii_hexdigit())
    });
    has_ext && stem_is_key
}
