// ABOUTME: Temporary AWS session credentials and the trait that supplies them.
// ABOUTME: Debug output never shows the secret key or session token.

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use bless_core::RequestContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Complete session credentials, as cached on disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub expiration: DateTime<Utc>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl Credentials {
    /// Still usable `window` before `expiration`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now < self.expiration - window
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Credentials as an exchange returns them, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl RawCredentials {
    /// Require every field; an empty string counts as missing.
    pub fn into_credentials(self, operation: &'static str) -> Result<Credentials> {
        let required = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or(AwsError::MalformedCredentials { operation, field })
        };
        Ok(Credentials {
            access_key_id: required(self.access_key_id, "access_key_id")?,
            secret_access_key: required(self.secret_access_key, "secret_access_key")?,
            session_token: required(self.session_token, "session_token")?,
            expiration: self.expiration.ok_or(AwsError::MalformedCredentials {
                operation,
                field: "expiration",
            })?,
        })
    }
}

/// Anything that can produce session credentials for a request.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(&self, ctx: &RequestContext) -> Result<Credentials>;
}
