// ABOUTME: blessclient's request flow: config, signing protocol and region fallback.
// ABOUTME: Wires the kmsauth, AWS and SSH crates into one certificate request.

//! # bless-client
//!
//! One invocation of [`CertificateRequester::run`]:
//!
//! 1. Ask the [`KeyManager`](bless_ssh::KeyManager) whether a usable certificate
//!    is already installed; if so, stop.
//! 2. Acquire session credentials and resolve the caller's username.
//! 3. For each configured region in order: connect, build a region-scoped
//!    kmsauth token, call the signer. The first success is installed; failures
//!    are collected and the next region is tried.
//!
//! Regions are never contacted in parallel, so at most one certificate is
//! issued per run.

mod config;
mod error;
mod orchestrator;
mod payload;
mod region;
mod signer;

pub use config::{ClientConfig, Config, LambdaConfig, RegionConfig};
pub use error::{ClientError, ErrorKind, RegionFailures, Result};
pub use orchestrator::{CertificateRequester, Outcome, USER_TYPE};
pub use payload::{SigningRequest, SigningResponse, BASTION_USER_IP, COMMAND_WILDCARD};
pub use region::{AwsRegionConnector, RegionClients, RegionConnector};
pub use signer::{LambdaSigner, Signer};
