// ABOUTME: KMSAuth: identity assertions encrypted under a KMS key with a bound context.
// ABOUTME: Token generation with a context-checked file cache, and the matching validator.

//! # bless-kmsauth
//!
//! A KMSAuth token is a small JSON time window encrypted with a symmetric KMS
//! key. The encryption context carries the caller identity, so the ciphertext
//! only decrypts for the same `from`/`to`/`user` triple. Nothing is signed.
//!
//! - [`AuthContext`]: who is asserting what to whom (V1 or V2)
//! - [`TokenGenerator`]: builds, encrypts and caches tokens
//! - [`TokenValidator`]: the signer-side check, used in tests and tooling
//! - [`Kms`]: the encrypt/decrypt capability, implemented over AWS KMS elsewhere

mod context;
mod error;
mod generator;
mod kms;
mod token;
mod validator;

#[cfg(any(test, feature = "test-util"))]
mod memory;

pub use context::{AuthContext, KmsContext, TokenVersion};
pub use error::{KmsAuthError, Result};
pub use generator::{TokenGenerator, DEFAULT_TOKEN_LIFETIME_SECS};
pub use kms::{Decrypted, Kms};
pub use token::{EncryptedToken, Token, TokenCacheEntry, TOKEN_TIME_FORMAT, TOKEN_TIME_SKEW_SECS};
pub use validator::TokenValidator;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryKms;
