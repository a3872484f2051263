// ABOUTME: Error types for cache files and the cache lock.
// ABOUTME: Corrupt cache contents are a distinct variant so callers can fail closed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading, writing, or locking a cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache file exists but could not be read.
    #[error("could not read cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but does not hold a valid entry.
    #[error("cache corrupted at {path}, please delete it: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The entry could not be serialized.
    #[error("could not serialize cache entry: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Failed to create the cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write or replace the cache file.
    #[error("could not write cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lockfile could not be created or inspected.
    #[error("could not use cache lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process held the lock for longer than the retry budget.
    #[error("timed out after {waited:?} waiting for cache lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },
}

/// Result type alias using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_corrupt_error_display_mentions_path() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = CacheError::Corrupt {
            path: PathBuf::from("/tmp/cache/kmsauth/us-west-2.json"),
            source,
        };
        let display = err.to_string();
        assert!(display.contains("cache corrupted"));
        assert!(display.contains("us-west-2.json"));
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = CacheError::LockTimeout {
            path: PathBuf::from("/tmp/.lock"),
            waited: Duration::from_secs(20),
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_write_error_display() {
        let err = CacheError::Write {
            path: PathBuf::from("/tmp/cache.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        assert!(err.to_string().contains("could not write cache"));
    }
}
