// ABOUTME: AWS side of blessclient: SDK config, KMS, Lambda, IAM and STS adapters.
// ABOUTME: Also hosts the MFA-gated, file-cached session credential provider.

//! # bless-aws
//!
//! Thin adapters that turn AWS SDK calls into the capabilities the rest of
//! blessclient is written against:
//!
//! - [`AwsKms`] implements [`bless_kmsauth::Kms`]
//! - [`LambdaInvoker`] calls the signing function
//! - [`AwsIdentity`] answers "who am I" and "which MFA device" via IAM, and
//!   exchanges MFA codes for session credentials via STS
//! - [`MfaCredentialProvider`] caches those session credentials on disk
//!
//! Every SDK call runs inside a [`bless_core::RequestContext`] so it can be
//! cancelled or time out.

mod credentials;
mod error;
mod identity;
mod kms;
mod lambda;
mod mfa;
mod sdk;

pub use credentials::{CredentialSource, Credentials, RawCredentials};
pub use error::{AwsError, Result};
pub use identity::{AwsIdentity, IdentityService, SessionTokenService};
pub use kms::AwsKms;
pub use lambda::LambdaInvoker;
pub use mfa::{Interactivity, MfaCredentialProvider, MfaPrompt, DEFAULT_SESSION_SECS, EXPIRY_WINDOW_SECS};
pub use sdk::{load_base_config, with_credentials, with_region};

// Re-export the SDK config type callers pass around
pub use aws_config::SdkConfig;
