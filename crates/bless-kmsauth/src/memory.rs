// ABOUTME: In-memory Kms with real context binding and call counting.
// ABOUTME: Ciphertexts are opaque handles; decrypting under another context fails.

use crate::context::KmsContext;
use crate::error::{KmsAuthError, Result};
use crate::kms::{Decrypted, Kms};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct Sealed {
    key_id: String,
    context: KmsContext,
    plaintext: Vec<u8>,
}

/// Stores every encryption and hands back its index as ciphertext.
#[derive(Default)]
pub struct MemoryKms {
    sealed: Mutex<Vec<Sealed>>,
    encrypts: AtomicUsize,
    fail_with: Mutex<Option<String>>,
}

impl MemoryKms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of encrypt calls so far, failed ones included.
    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    /// Make every later call fail with `message`; `None` restores service.
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    fn check_failure(&self, operation: &'static str) -> Result<()> {
        match &*self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(message) => Err(KmsAuthError::Kms {
                operation,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Kms for MemoryKms {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &KmsContext,
    ) -> Result<Vec<u8>> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.check_failure("encrypt")?;

        let mut sealed = self.sealed.lock().unwrap_or_else(|e| e.into_inner());
        sealed.push(Sealed {
            key_id: key_id.to_string(),
            context: context.clone(),
            plaintext: plaintext.to_vec(),
        });
        Ok(format!("sealed:{}", sealed.len() - 1).into_bytes())
    }

    async fn decrypt(&self, ciphertext: &[u8], context: &KmsContext) -> Result<Decrypted> {
        self.check_failure("decrypt")?;

        let invalid = || KmsAuthError::Kms {
            operation: "decrypt",
            message: "InvalidCiphertextException".to_string(),
        };
        let index: usize = std::str::from_utf8(ciphertext)
            .ok()
            .and_then(|s| s.strip_prefix("sealed:"))
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;

        let sealed = self.sealed.lock().unwrap_or_else(|e| e.into_inner());
        match sealed.get(index) {
            Some(entry) if &entry.context == context => Ok(Decrypted {
                plaintext: entry.plaintext.clone(),
                key_id: entry.key_id.clone(),
            }),
            _ => Err(invalid()),
        }
    }
}
