// ABOUTME: Cross-process pid lockfile guarding cache mutation.
// ABOUTME: Contention is retried with exponential backoff; stale lockfiles are reclaimed by rename.

use crate::backoff::Backoff;
use crate::error::{CacheError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

/// Name of the lockfile inside the cache directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Lockfiles older than this are left over from a crashed process.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

/// Advisory lock shared by every process using the same cache directory.
///
/// Created once per invocation and handed to each cache that lives under the
/// directory, so all writers serialize on the same file.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    backoff: Backoff,
    stale_after: Duration,
}

impl CacheLock {
    /// Create a lock for `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(LOCK_FILE_NAME);
        debug!(lock_path = %path.display(), "Creating cache lock");
        Ok(Self {
            path,
            backoff: Backoff::default(),
            stale_after: DEFAULT_STALE_AFTER,
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying on contention until the backoff budget runs out.
    pub async fn acquire(&self) -> Result<CacheLockGuard<'_>> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if self.try_acquire()? {
                return Ok(CacheLockGuard { lock: self });
            }
            let delay = self.backoff.delay(attempt);
            let waited = started.elapsed();
            if waited + delay > self.backoff.max_elapsed {
                return Err(CacheError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Cache lock busy, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One non-blocking attempt. Ok(false) means another holder owns the lock.
    pub fn try_acquire(&self) -> Result<bool> {
        match self.create() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match self.stale_contents()? {
                Some(observed) => {
                    debug!(lock_path = %self.path.display(), "Reclaiming stale cache lock");
                    if !self.reclaim(&observed)? {
                        return Ok(false);
                    }
                    match self.create() {
                        Ok(()) => Ok(true),
                        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                        Err(e) => Err(self.lock_error(e)),
                    }
                }
                None => Ok(false),
            },
            Err(e) => Err(self.lock_error(e)),
        }
    }

    fn create(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let nonce = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos();
        writeln!(file, "{} {nonce}", std::process::id())
    }

    /// Contents of the lockfile if it is stale, so a reclaim can prove it moved that file.
    fn stale_contents(&self) -> Result<Option<String>> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            // released between our create attempt and now
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(String::new())),
            Err(e) => return Err(self.lock_error(e)),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age <= self.stale_after {
            return Ok(None);
        }
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(String::new())),
            Err(e) => Err(self.lock_error(e)),
        }
    }

    /// Move the lockfile aside and drop it only if it is still the one judged stale.
    ///
    /// Renames are atomic, so of several reclaimers only one moves any given
    /// file. A reclaimer that moved a fresh lock instead puts it back.
    fn reclaim(&self, observed: &str) -> Result<bool> {
        let aside = self.reclaim_path();
        match std::fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(self.lock_error(e)),
        }

        let moved = std::fs::read_to_string(&aside).map_err(|e| self.lock_error(e))?;
        if moved == observed {
            let _ = std::fs::remove_file(&aside);
            return Ok(true);
        }

        debug!(lock_path = %self.path.display(), "Lock changed hands during reclaim, restoring");
        let restored = std::fs::hard_link(&aside, &self.path);
        let _ = std::fs::remove_file(&aside);
        match restored {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(self.lock_error(e)),
        }
    }

    fn reclaim_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}.reclaim", std::process::id()));
        PathBuf::from(name)
    }

    fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                debug!(lock_path = %self.path.display(), error = %e, "Could not remove cache lock");
            }
        }
    }

    fn lock_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

/// Held lock. Dropping it removes the lockfile.
#[derive(Debug)]
pub struct CacheLockGuard<'a> {
    lock: &'a CacheLock,
}

impl Drop for CacheLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
