// ABOUTME: ssh-agent key lifecycle: install, list and evict blessclient certificates.
// ABOUTME: AgentBackend is the narrow capability the manager needs; tests swap in an in-memory agent.

use crate::cert::SIGNER_EXTENSION;
use crate::error::{Result, SshError};
use crate::key::generate_ephemeral_key;
use crate::manager::KeyManager;
use async_trait::async_trait;
use bless_core::Clock;
use chrono::{DateTime, Local, Utc};
use ssh_key::public::KeyData;
use ssh_key::{Certificate, PrivateKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// A public credential held by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCredential {
    Key(KeyData),
    Certificate(Box<Certificate>),
}

/// One entry from the agent's identity list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub credential: AgentCredential,
    pub comment: String,
}

/// A private key plus certificate to hand to the agent.
#[derive(Debug, Clone)]
pub struct AddedKey {
    pub private_key: PrivateKey,
    pub certificate: Certificate,
    pub comment: String,
    /// The agent drops the key after this many seconds.
    pub lifetime_secs: u32,
}

/// The subset of the agent protocol blessclient uses.
#[async_trait]
pub trait AgentBackend: Send {
    async fn list(&mut self) -> Result<Vec<AgentIdentity>>;
    async fn add(&mut self, key: AddedKey) -> Result<()>;
    async fn remove(&mut self, credential: &AgentCredential) -> Result<()>;
}

/// Key manager backed by a running ssh-agent. Private keys never touch disk.
pub struct AgentKeyManager<A> {
    agent: A,
    clock: Arc<dyn Clock>,
}

impl<A: AgentBackend> AgentKeyManager<A> {
    pub fn new(agent: A, clock: Arc<dyn Clock>) -> Self {
        Self { agent, clock }
    }

    pub fn into_inner(self) -> A {
        self.agent
    }

    fn comment(now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&Local);
        format!("Added by blessclient at {}", local.format("%a %b %e %H:%M:%S %Z %Y"))
    }
}

impl AgentCredential {
    /// The bare public key, for certificates the key being certified.
    pub fn key_data(&self) -> &KeyData {
        match self {
            AgentCredential::Key(key) => key,
            AgentCredential::Certificate(cert) => cert.public_key(),
        }
    }
}

impl<A: AgentBackend> AgentKeyManager<A> {
    /// Evict every identity, bare or certified, for `key`.
    async fn remove_matching(&mut self, key: &KeyData) -> Result<()> {
        let matching = self
            .agent
            .list()
            .await?
            .into_iter()
            .filter(|identity| identity.credential.key_data() == key)
            .collect::<Vec<_>>();
        for identity in matching {
            self.agent.remove(&identity.credential).await?;
        }
        Ok(())
    }
}

/// Seconds until `cert` expires, capped to what the agent protocol can carry.
///
/// `None` once expired: a lifetime constraint of 0 means "forever" to the agent.
pub(crate) fn lifetime_secs(cert: &Certificate, now: DateTime<Utc>) -> Option<u32> {
    let remaining = cert.valid_before() as i64 - now.timestamp();
    (remaining > 0).then(|| remaining.min(u32::MAX as i64) as u32)
}

#[async_trait]
impl<A: AgentBackend> KeyManager for AgentKeyManager<A> {
    async fn get_key(&mut self) -> Result<PrivateKey> {
        generate_ephemeral_key()
    }

    async fn write_key(&mut self, private_key: &PrivateKey, cert: &Certificate) -> Result<()> {
        let now = self.clock.now();
        let lifetime_secs =
            lifetime_secs(cert, now).ok_or_else(|| SshError::ExpiredCertificate {
                key_id: cert.key_id().to_string(),
            })?;

        // Duplicates are harmless, so a failed removal is not worth surfacing.
        if let Err(e) = self.remove_matching(private_key.public_key().key_data()).await {
            debug!(error = %e, "Could not remove previous key from agent");
        }

        debug!(lifetime_secs, key_id = cert.key_id(), "Adding certificate to agent");
        self.agent
            .add(AddedKey {
                private_key: private_key.clone(),
                certificate: cert.clone(),
                comment: Self::comment(now),
                lifetime_secs,
            })
            .await
    }

    async fn list_certificates(&mut self) -> Result<Vec<Certificate>> {
        let now = self.clock.now().timestamp();
        let identities = self.agent.list().await?;

        let certs = identities
            .into_iter()
            .filter_map(|identity| match identity.credential {
                AgentCredential::Certificate(cert) => Some(*cert),
                AgentCredential::Key(_) => None,
            })
            .filter(|cert| cert.extensions().contains_key(SIGNER_EXTENSION))
            .filter(|cert| {
                let in_window =
                    (cert.valid_after() as i64) < now && now < cert.valid_before() as i64;
                if !in_window {
                    debug!(key_id = cert.key_id(), "Skipping expired agent certificate");
                }
                in_window
            })
            .collect::<Vec<_>>();

        if certs.len() > 1 {
            warn!(count = certs.len(), "Multiple blessclient certificates in agent");
        }
        Ok(certs)
    }
}
