// ABOUTME: Token time window, encrypted token wrapper and the on-disk cache entry.
// ABOUTME: Times serialize as compact UTC strings like 20240102T150405Z.

use crate::context::KmsContext;
use crate::error::{KmsAuthError, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// strftime format of token timestamps.
pub const TOKEN_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Clock drift allowance between this host and the signer.
pub const TOKEN_TIME_SKEW_SECS: i64 = 180;

mod token_time {
    use super::TOKEN_TIME_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(TOKEN_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TOKEN_TIME_FORMAT)
            .map(|t| t.and_utc())
            .map_err(|e| de::Error::custom(format!("could not parse time {raw}: {e}")))
    }
}

/// Validity window of one identity assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(with = "token_time")]
    pub not_before: DateTime<Utc>,
    #[serde(with = "token_time")]
    pub not_after: DateTime<Utc>,
}

impl Token {
    /// Window padded by the skew on both sides, so its span is exactly `lifetime`.
    pub fn new(now: DateTime<Utc>, lifetime: Duration) -> Self {
        let now = now.trunc_subsecs(0);
        let skew = Duration::seconds(TOKEN_TIME_SKEW_SECS);
        Self {
            not_before: now - skew,
            not_after: now + lifetime - skew,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.not_after - self.not_before
    }

    /// Reuse is allowed until one skew before expiry.
    pub fn is_reusable(&self, now: DateTime<Utc>) -> bool {
        now < self.not_after - Duration::seconds(TOKEN_TIME_SKEW_SECS)
    }

    /// Signer-side acceptance: bounded lifetime and `now` inside the window.
    pub fn is_valid(&self, now: DateTime<Utc>, max_lifetime: Duration) -> Result<()> {
        if self.lifetime() > max_lifetime {
            return Err(KmsAuthError::LifetimeExceeded);
        }
        if now < self.not_before || now > self.not_after {
            return Err(KmsAuthError::OutsideValidity);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(KmsAuthError::Serialize)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(KmsAuthError::ParseToken)
    }
}

/// Base64 KMS ciphertext of a serialized [`Token`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedToken(String);

impl EncryptedToken {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Bearer material: show only the size.
impl fmt::Debug for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedToken({} bytes)", self.0.len())
    }
}

/// What the generator persists between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCacheEntry {
    pub token: Token,
    pub encrypted_token: EncryptedToken,
    pub auth_context: KmsContext,
}

impl TokenCacheEntry {
    /// Usable only for the identical context and before `not_after - skew`.
    pub fn matches(&self, context: &KmsContext, now: DateTime<Utc>) -> bool {
        &self.auth_context == context && self.token.is_reusable(now)
    }
}
