// ABOUTME: The symmetric encryption capability KMSAuth needs from a key service.
// ABOUTME: Implemented over AWS KMS in bless-aws and in memory for tests.

use crate::context::KmsContext;
use crate::error::Result;
use async_trait::async_trait;

/// Plaintext plus the id of the key that decrypted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    pub key_id: String,
}

#[async_trait]
pub trait Kms: Send + Sync {
    /// Encrypt `plaintext` under `key_id`, binding `context` as associated data.
    async fn encrypt(&self, key_id: &str, plaintext: &[u8], context: &KmsContext)
        -> Result<Vec<u8>>;

    /// Decrypt; fails unless `context` matches the one used to encrypt.
    async fn decrypt(&self, ciphertext: &[u8], context: &KmsContext) -> Result<Decrypted>;
}
