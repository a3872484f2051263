// ABOUTME: Test helpers that mint real signed certificates.
// ABOUTME: A throwaway CA key signs certificates with arbitrary windows and options.

use crate::cert::{SIGNER_EXTENSION, SOURCE_ADDRESS};
use chrono::{DateTime, Utc};
use ssh_key::certificate::{Builder, CertType};
use ssh_key::{Algorithm, Certificate, PrivateKey};

pub(crate) struct CertSpec {
    pub valid_after: DateTime<Utc>,
    pub valid_before: DateTime<Utc>,
    pub principals: Vec<String>,
    pub source_address: Option<String>,
    pub signer_extension: bool,
}

pub(crate) fn key() -> PrivateKey {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .expect("should generate ed25519 key")
}

/// Issue a certificate for a fresh subject key.
pub(crate) fn issue(spec: &CertSpec) -> Certificate {
    issue_for(&key(), spec)
}

/// Issue a certificate for `subject`.
pub(crate) fn issue_for(subject: &PrivateKey, spec: &CertSpec) -> Certificate {
    let ca = key();
    let mut builder = Builder::new_with_random_nonce(
        &mut rand::thread_rng(),
        subject.public_key().key_data().clone(),
        spec.valid_after.timestamp() as u64,
        spec.valid_before.timestamp() as u64,
    )
    .expect("should create builder");
    builder.serial(1).unwrap();
    builder.key_id("test-cert").unwrap();
    builder.cert_type(CertType::User).unwrap();
    for principal in &spec.principals {
        builder.valid_principal(principal.clone()).unwrap();
    }
    if spec.principals.is_empty() {
        builder.all_principals_valid().unwrap();
    }
    if let Some(source) = &spec.source_address {
        builder.critical_option(SOURCE_ADDRESS, source.clone()).unwrap();
    }
    if spec.signer_extension {
        builder.extension(SIGNER_EXTENSION, "").unwrap();
    }
    builder.extension("permit-pty", "").unwrap();
    builder.sign(&ca).expect("should sign certificate")
}
