// ABOUTME: KeyManager trait: where the signing key comes from and where the certificate goes.
// ABOUTME: FileKeyManager implements it over the on-disk key triple.

use crate::cert::{parse_certificate, FreshnessPolicy};
use crate::error::Result;
use crate::key::KeyFiles;
use async_trait::async_trait;
use bless_core::Clock;
use ssh_key::{Certificate, PrivateKey};
use std::sync::Arc;
use tracing::debug;

/// Storage for the key pair and certificate blessclient manages.
#[async_trait]
pub trait KeyManager: Send {
    /// The private key whose public half will be signed.
    async fn get_key(&mut self) -> Result<PrivateKey>;

    /// Install `cert` together with its private key.
    async fn write_key(&mut self, private_key: &PrivateKey, cert: &Certificate) -> Result<()>;

    /// Certificates currently installed by this manager.
    async fn list_certificates(&mut self) -> Result<Vec<Certificate>>;

    /// Whether a usable certificate is already installed.
    async fn has_valid_certificate(&mut self) -> Result<bool> {
        Ok(!self.list_certificates().await?.is_empty())
    }
}

/// Keys and certificates kept in the `<name>`, `<name>.pub`, `<name>-cert.pub` files.
pub struct FileKeyManager {
    files: KeyFiles,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
}

impl FileKeyManager {
    pub fn new(files: KeyFiles, policy: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            files,
            policy,
            clock,
        }
    }

    pub fn files(&self) -> &KeyFiles {
        &self.files
    }
}

#[async_trait]
impl KeyManager for FileKeyManager {
    async fn get_key(&mut self) -> Result<PrivateKey> {
        self.files.load_or_generate_key()
    }

    async fn write_key(&mut self, _private_key: &PrivateKey, cert: &Certificate) -> Result<()> {
        self.files.write_certificate(cert)
    }

    async fn list_certificates(&mut self) -> Result<Vec<Certificate>> {
        match self.files.read_certificate()? {
            Some(bytes) => Ok(vec![parse_certificate(&bytes)?]),
            None => Ok(Vec::new()),
        }
    }

    /// Full freshness check: window with skew, source address and principals.
    async fn has_valid_certificate(&mut self) -> Result<bool> {
        let cert = self.files.read_certificate()?;
        let fresh = self.policy.is_fresh(cert.as_deref(), self.clock.now())?;
        debug!(path = %self.files.certificate_path().display(), fresh, "Checked certificate file");
        Ok(fresh)
    }
}
