// ABOUTME: Error types for KMSAuth token generation and validation using thiserror.
// ABOUTME: Separates KMS transport failures from local cache and validation failures.

use bless_core::{CacheError, Interrupted};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmsAuthError {
    /// A required AuthContext field is empty.
    #[error("invalid auth context: {0} is required")]
    MissingField(&'static str),

    /// The KMS service call failed.
    #[error("kms {operation} failed: {message}")]
    Kms {
        operation: &'static str,
        message: String,
    },

    /// Reading or writing the token cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("could not serialize token: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Decrypted plaintext was not a token.
    #[error("could not parse token: {0}")]
    ParseToken(#[source] serde_json::Error),

    #[error("could not base64 decode token: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The token was encrypted under a key outside the allow-list.
    #[error("invalid KMS key used {0}")]
    UnauthorizedKey(String),

    #[error("token issued for longer than the token lifetime")]
    LifetimeExceeded,

    #[error("invalid time validity for token")]
    OutsideValidity,

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl KmsAuthError {
    /// True for failures of the remote KMS call rather than local state.
    pub fn is_transport(&self) -> bool {
        matches!(self, KmsAuthError::Kms { .. })
    }
}

pub type Result<T> = std::result::Result<T, KmsAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kms_error_is_transport() {
        let err = KmsAuthError::Kms {
            operation: "encrypt",
            message: "throttled".to_string(),
        };
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "kms encrypt failed: throttled");
        assert!(!KmsAuthError::LifetimeExceeded.is_transport());
    }
}
