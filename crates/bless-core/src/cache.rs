// ABOUTME: JSON file cache with in-process read/write locking.
// ABOUTME: Writes take the cross-process CacheLock and replace the file atomically.

use crate::error::{CacheError, Result};
use crate::lock::CacheLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A single JSON document on disk holding one cache entry of type `T`.
///
/// A missing file is "no entry". A file that does not parse is an error: a
/// tampered or truncated cache is never silently treated as a miss.
#[derive(Debug)]
pub struct JsonCache<T> {
    path: PathBuf,
    lock: Arc<CacheLock>,
    rw: RwLock<()>,
    _entry: PhantomData<fn() -> T>,
}

impl<T> JsonCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>, lock: Arc<CacheLock>) -> Self {
        Self {
            path: path.into(),
            lock,
            rw: RwLock::new(()),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the entry, if any.
    pub async fn load(&self) -> Result<Option<T>> {
        let _read = self.rw.read().await;

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file");
                return Ok(None);
            }
            Err(e) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the entry. Parent directories are created as needed.
    pub async fn store(&self, entry: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(entry).map_err(CacheError::Serialize)?;

        let _write = self.rw.write().await;
        let _lock = self.lock.acquire().await?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp_path = self.tmp_path();
        if let Err(e) = self.replace_with(&tmp_path, &data) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        debug!(path = %self.path.display(), "Wrote cache entry");
        Ok(())
    }

    /// Write `data` to `tmp_path` and rename it over the entry.
    fn replace_with(&self, tmp_path: &Path, data: &[u8]) -> Result<()> {
        std::fs::write(tmp_path, data).map_err(|e| self.write_error(tmp_path, e))?;

        // Cached credentials are secrets: 0600 = rw-------
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.write_error(tmp_path, e))?;
        }

        std::fs::rename(tmp_path, &self.path).map_err(|e| self.write_error(&self.path, e))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn write_error(&self, path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        value: String,
    }

    fn cache_in(dir: &TempDir, name: &str) -> JsonCache<Entry> {
        let lock = Arc::new(CacheLock::new(dir.path()).expect("should create lock"));
        JsonCache::new(dir.path().join("nested").join(name), lock)
    }

    #[tokio::test]
    async fn test_missing_file_is_no_entry() {
        let dir = TempDir::new().expect("should create temp dir");
        let cache = cache_in(&dir, "missing.json");

        assert_eq!(cache.load().await.expect("should load"), None);
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = TempDir::new().expect("should create temp dir");
        let cache = cache_in(&dir, "entry.json");
        let entry = Entry {
            value: "hello".to_string(),
        };

        cache.store(&entry).await.expect("should store");

        assert_eq!(cache.load().await.expect("should load"), Some(entry));
        assert!(!dir.path().join(".lock").exists(), "lock released after write");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let cache = cache_in(&dir, "corrupt.json");
        std::fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        std::fs::write(cache.path(), "{not json").unwrap();

        let err = cache.load().await.expect_err("corrupt cache should fail");
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cache_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("should create temp dir");
        let cache = cache_in(&dir, "secret.json");
        cache
            .store(&Entry {
                value: "secret".to_string(),
            })
            .await
            .expect("should store");

        let mode = std::fs::metadata(cache.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "cache file should have 0600 permissions");
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_temp_file() {
        let dir = TempDir::new().expect("should create temp dir");
        let cache = cache_in(&dir, "entry.json");
        // A non-empty directory where the entry belongs makes the rename fail.
        std::fs::create_dir_all(cache.path().join("occupied")).unwrap();

        let err = cache
            .store(&Entry {
                value: "hello".to_string(),
            })
            .await
            .expect_err("rename over a directory should fail");

        assert!(matches!(err, CacheError::Write { .. }));
        let names: Vec<_> = std::fs::read_dir(cache.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("entry.json")]);
    }
}
