// ABOUTME: Error types for AWS adapter calls using thiserror.
// ABOUTME: LoginRequired is kept distinct so callers can ask the user to re-authenticate.

use bless_core::{CacheError, Interrupted};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    /// An AWS API call failed.
    #[error("{service} {operation} failed: {message}")]
    Sdk {
        service: &'static str,
        operation: &'static str,
        message: String,
    },

    /// An AWS API call succeeded but omitted data it always returns.
    #[error("empty output returned from {0}")]
    EmptyResponse(&'static str),

    /// Session credentials came back with a required field missing or empty.
    #[error("received malformed credentials from {operation}: missing {field}")]
    MalformedCredentials {
        operation: &'static str,
        field: &'static str,
    },

    #[error("MFA not configured for this user")]
    NoMfaDevice,

    /// Cached credentials are missing or expired and no prompt is available.
    #[error("looks like you need to log in, please run `blessclient login`")]
    LoginRequired,

    #[error("could not read MFA token: {0}")]
    Prompt(#[source] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl AwsError {
    /// True for remote service failures, which are worth retrying elsewhere.
    pub fn is_transport(&self) -> bool {
        matches!(self, AwsError::Sdk { .. } | AwsError::EmptyResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Flatten an SDK error and its source chain into an [`AwsError::Sdk`].
pub(crate) fn sdk_error(
    service: &'static str,
    operation: &'static str,
    err: impl std::error::Error,
) -> AwsError {
    AwsError::Sdk {
        service,
        operation,
        message: aws_sdk_sts::error::DisplayErrorContext(&err).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(AwsError::EmptyResponse("iam GetUser").is_transport());
        assert!(!AwsError::LoginRequired.is_transport());
        assert!(!AwsError::NoMfaDevice.is_transport());
    }

    #[test]
    fn test_sdk_error_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
        let err = sdk_error("lambda", "Invoke", io);
        assert!(err.to_string().starts_with("lambda Invoke failed: "));
        assert!(err.to_string().contains("connect timed out"));
    }
}
