// ABOUTME: SSH certificate and key handling for blessclient.
// ABOUTME: Freshness checks, on-disk key triples, and ssh-agent key lifecycle.

//! # bless-ssh
//!
//! Everything blessclient does with SSH material locally.
//!
//! ## Features
//!
//! - **Freshness**: decide whether an installed certificate can be reused
//! - **Key files**: the `<name>`, `<name>.pub`, `<name>-cert.pub` triple
//! - **Agent**: install, list and evict certificates held by `ssh-agent`
//! - **Advisory**: warn about key types the local ssh client cannot use with certificates
//!
//! ## Example
//!
//! ```no_run
//! use bless_ssh::{FreshnessPolicy, KeyFiles};
//! use std::path::Path;
//!
//! let files = KeyFiles::new(Path::new("/home/me/.ssh/blessclient"));
//! let policy = FreshnessPolicy::new(vec!["me".to_string()], &["10.0.0.0/8".to_string()]);
//! let cert = files.read_certificate().expect("cert should read");
//! let fresh = policy
//!     .is_fresh(cert.as_deref(), chrono::Utc::now())
//!     .expect("cert should parse");
//! println!("fresh: {fresh}");
//! ```

mod agent;
mod cert;
mod error;
mod key;
mod manager;
mod print;
mod socket;
mod version;

#[cfg(test)]
mod testing;

pub use agent::{AddedKey, AgentBackend, AgentCredential, AgentIdentity, AgentKeyManager};
pub use cert::{
    parse_certificate, FreshnessPolicy, CERT_TIME_SKEW_SECS, SIGNER_EXTENSION, SOURCE_ADDRESS,
};
pub use error::{Result, SshError};
pub use key::{expand_path, generate_ephemeral_key, KeyFiles};
pub use manager::{FileKeyManager, KeyManager};
pub use print::print_certificate;
pub use socket::SocketAgent;
pub use version::{check_key_type_and_client_version, ssh_client_version};

// Re-export ssh_key types for convenience
pub use ssh_key::{Certificate, PrivateKey, PublicKey};
