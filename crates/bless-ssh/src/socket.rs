// ABOUTME: AgentBackend over the ssh-agent unix socket.
// ABOUTME: Adds keys through ssh-agent-lib; lists and removes over raw frames so certificate identities survive.

use crate::agent::{AddedKey, AgentBackend, AgentCredential, AgentIdentity};
use crate::error::{Result, SshError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ssh_agent_lib::agent::Session;
use ssh_agent_lib::client::Client;
use ssh_agent_lib::proto::{
    AddIdentity, AddIdentityConstrained, Credential, KeyConstraint, PrivateKeyData,
};
use ssh_key::private::KeypairData;
use ssh_key::{Certificate, PublicKey};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

/// Environment variable naming the agent socket.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

const AGENT_FAILURE: u8 = 5;
const AGENT_SUCCESS: u8 = 6;
const REQUEST_IDENTITIES: u8 = 11;
const IDENTITIES_ANSWER: u8 = 12;
const REMOVE_IDENTITY: u8 = 18;

/// Key type suffix of OpenSSH certificate blobs.
const CERT_TYPE_SUFFIX: &str = "-cert-v01@openssh.com";

/// Upper bound on a single agent reply, as OpenSSH enforces.
const MAX_MESSAGE_LEN: usize = 256 * 1024;

/// A connected ssh-agent.
pub struct SocketAgent {
    path: PathBuf,
    client: Client<UnixStream>,
}

impl fmt::Debug for SocketAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketAgent").field("path", &self.path).finish()
    }
}

impl SocketAgent {
    pub async fn connect(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Connecting to ssh-agent");
        let stream = dial(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            client: Client::new(stream),
        })
    }

    /// Connect to the agent named by `SSH_AUTH_SOCK`.
    pub async fn from_env() -> Result<Self> {
        match std::env::var_os(SSH_AUTH_SOCK) {
            Some(path) if !path.is_empty() => Self::connect(Path::new(&path)).await,
            _ => Err(SshError::NoAgentSocket),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One request/reply exchange on a fresh connection.
    async fn exchange(&self, operation: &'static str, request: &[u8]) -> Result<Vec<u8>> {
        let mut stream = dial(&self.path).await?;
        let io_error = |e: std::io::Error| agent_error(operation, e);

        stream.write_u32(request.len() as u32).await.map_err(io_error)?;
        stream.write_all(request).await.map_err(io_error)?;

        let len = stream.read_u32().await.map_err(io_error)? as usize;
        if len == 0 || len > MAX_MESSAGE_LEN {
            return Err(agent_error(operation, format!("bad reply length {len}")));
        }
        let mut reply = vec![0u8; len];
        stream.read_exact(&mut reply).await.map_err(io_error)?;
        Ok(reply)
    }
}

async fn dial(path: &Path) -> Result<UnixStream> {
    UnixStream::connect(path)
        .await
        .map_err(|e| SshError::AgentConnect {
            path: path.to_path_buf(),
            source: e,
        })
}

fn agent_error(operation: &'static str, err: impl fmt::Display) -> SshError {
    SshError::Agent {
        operation,
        message: err.to_string(),
    }
}

/// Reads SSH wire primitives from an agent reply.
struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(agent_error("list", "truncated identities answer"));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

fn put_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Decode an identities answer, certificates included.
///
/// Identities of a type ssh-key cannot parse are skipped.
pub(crate) fn decode_identities_answer(reply: &[u8]) -> Result<Vec<AgentIdentity>> {
    let mut reader = WireReader { buf: reply };
    match reader.u8()? {
        IDENTITIES_ANSWER => {}
        AGENT_FAILURE => return Err(agent_error("list", "agent refused")),
        other => return Err(agent_error("list", format!("unexpected reply type {other}"))),
    }

    let count = reader.u32()?;
    let mut identities = Vec::new();
    for _ in 0..count {
        let blob = reader.string()?;
        let comment = String::from_utf8_lossy(reader.string()?).into_owned();
        match decode_credential(blob) {
            Ok(credential) => identities.push(AgentIdentity {
                credential,
                comment,
            }),
            Err(e) => debug!(comment = %comment, error = %e, "Skipping agent identity"),
        }
    }
    Ok(identities)
}

/// Parse a public key or certificate blob by its leading key type.
fn decode_credential(blob: &[u8]) -> Result<AgentCredential> {
    let key_type = WireReader { buf: blob }.string()?;
    let key_type = std::str::from_utf8(key_type)
        .map_err(|_| agent_error("list", "key type is not UTF-8"))?;
    let openssh = format!("{key_type} {}", STANDARD.encode(blob));

    if key_type.ends_with(CERT_TYPE_SUFFIX) {
        let cert = Certificate::from_openssh(&openssh).map_err(SshError::ParseCertificate)?;
        Ok(AgentCredential::Certificate(Box::new(cert)))
    } else {
        let key = PublicKey::from_openssh(&openssh).map_err(SshError::ParseAgentKey)?;
        Ok(AgentCredential::Key(key.key_data().clone()))
    }
}

/// The wire blob behind an authorized-key line.
fn wire_blob(openssh: &str) -> Result<Vec<u8>> {
    let encoded = openssh
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| agent_error("remove", "malformed public key"))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| agent_error("remove", e))
}

fn credential_blob(credential: &AgentCredential) -> Result<Vec<u8>> {
    let openssh = match credential {
        AgentCredential::Key(key) => PublicKey::from(key.clone()).to_openssh(),
        AgentCredential::Certificate(cert) => cert.to_openssh(),
    }
    .map_err(SshError::SerializeKey)?;
    wire_blob(&openssh)
}

pub(crate) fn encode_remove_request(credential: &AgentCredential) -> Result<Vec<u8>> {
    let mut request = vec![REMOVE_IDENTITY];
    put_string(&mut request, &credential_blob(credential)?);
    Ok(request)
}

fn add_credential(key: AddedKey) -> Result<Credential> {
    let privkey = match key.private_key.key_data() {
        KeypairData::Ed25519(keypair) => PrivateKeyData::Ed25519(keypair.clone()),
        other => {
            return Err(SshError::UnsupportedKeyType(
                other
                    .algorithm()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string()),
            ))
        }
    };
    Ok(Credential::Cert {
        algorithm: key.private_key.algorithm(),
        certificate: Box::new(key.certificate),
        privkey,
        comment: key.comment,
    })
}

#[async_trait]
impl AgentBackend for SocketAgent {
    async fn list(&mut self) -> Result<Vec<AgentIdentity>> {
        let reply = self.exchange("list", &[REQUEST_IDENTITIES]).await?;
        decode_identities_answer(&reply)
    }

    async fn add(&mut self, key: AddedKey) -> Result<()> {
        let constraints = vec![KeyConstraint::Lifetime(key.lifetime_secs)];
        let credential = add_credential(key)?;
        self.client
            .add_identity_constrained(AddIdentityConstrained {
                identity: AddIdentity { credential },
                constraints,
            })
            .await
            .map_err(|e| agent_error("add", e))
    }

    async fn remove(&mut self, credential: &AgentCredential) -> Result<()> {
        let reply = self
            .exchange("remove", &encode_remove_request(credential)?)
            .await?;
        match reply.first() {
            Some(&AGENT_SUCCESS) => Ok(()),
            _ => Err(agent_error("remove", "agent refused")),
        }
    }
}
