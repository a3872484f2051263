// ABOUTME: Shared runtime primitives for the blessclient crates.
// ABOUTME: Clock injection, request cancellation, cache locking and JSON cache files.

//! # bless-core
//!
//! Small building blocks the credential and certificate crates share:
//!
//! - **Clock**: an injectable source of "now" so validity windows can be tested
//! - **RequestContext**: cancellation token + deadline threaded through every network call
//! - **CacheLock**: cross-process pid lockfile guarding cache mutation
//! - **JsonCache**: read/write-locked JSON file cache with atomic replacement

mod backoff;
mod cache;
mod clock;
mod context;
mod error;
mod lock;

pub use backoff::Backoff;
pub use cache::JsonCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{Interrupted, RequestContext};
pub use error::{CacheError, Result};
pub use lock::{CacheLock, CacheLockGuard};
