// ABOUTME: Client error taxonomy and the aggregate error for exhausted regions.
// ABOUTME: Conversions decide which lower-level failures stay scoped to one region.

use bless_aws::AwsError;
use bless_core::{CacheError, Interrupted};
use bless_kmsauth::KmsAuthError;
use bless_ssh::SshError;
use std::fmt;
use thiserror::Error;

/// Broad category of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid inputs. Fatal.
    Config,
    /// Network or service failure. Scoped to one region.
    Transport,
    /// Signer answered with an application error. Scoped to one region.
    Protocol,
    /// Corrupt local state. Fatal.
    Validation,
    /// The user must re-authenticate. Fatal.
    LoginRequired,
    /// Every region failed.
    AllRegionsFailed,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Transport(String),

    #[error("bless error: {}", protocol_message(error_type, message))]
    Protocol {
        error_type: String,
        message: Option<String>,
    },

    /// Malformed signer output that is not a structured error.
    #[error("invalid signer response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("looks like you need to log in, please run `blessclient login`")]
    LoginRequired,

    #[error(transparent)]
    AllRegionsFailed(RegionFailures),

    #[error(transparent)]
    Cancelled(#[from] Interrupted),
}

fn protocol_message(error_type: &str, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{error_type}: {message}"),
        None => error_type.to_string(),
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Config(_) => ErrorKind::Config,
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Protocol { .. } | ClientError::InvalidResponse(_) => ErrorKind::Protocol,
            ClientError::Validation(_) | ClientError::Cache(_) => ErrorKind::Validation,
            ClientError::Ssh(SshError::NoAgentSocket) => ErrorKind::Config,
            ClientError::Ssh(_) => ErrorKind::Validation,
            ClientError::LoginRequired => ErrorKind::LoginRequired,
            ClientError::AllRegionsFailed(_) => ErrorKind::AllRegionsFailed,
            ClientError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Whether the next region should be tried after this failure.
    pub fn is_region_scoped(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }
}

impl From<KmsAuthError> for ClientError {
    fn from(err: KmsAuthError) -> Self {
        match err {
            KmsAuthError::Kms { .. } => ClientError::Transport(err.to_string()),
            KmsAuthError::Cache(e) => ClientError::Cache(e),
            KmsAuthError::Interrupted(e) => ClientError::Cancelled(e),
            KmsAuthError::MissingField(_) => ClientError::Config(err.to_string()),
            other => ClientError::Validation(other.to_string()),
        }
    }
}

impl From<AwsError> for ClientError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Sdk { .. } | AwsError::EmptyResponse(_) => {
                ClientError::Transport(err.to_string())
            }
            AwsError::LoginRequired => ClientError::LoginRequired,
            AwsError::NoMfaDevice | AwsError::Prompt(_) => ClientError::Config(err.to_string()),
            AwsError::MalformedCredentials { .. } => ClientError::Validation(err.to_string()),
            AwsError::Cache(e) => ClientError::Cache(e),
            AwsError::Interrupted(e) => ClientError::Cancelled(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Per-region failures in the order the regions were tried.
#[derive(Debug, Default)]
pub struct RegionFailures {
    failures: Vec<(String, ClientError)>,
}

impl RegionFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: impl Into<String>, error: ClientError) {
        self.failures.push((region.into(), error));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClientError)> {
        self.failures.iter().map(|(r, e)| (r.as_str(), e))
    }
}

impl fmt::Display for RegionFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} region(s) failed:", self.failures.len())?;
        for (region, error) in &self.failures {
            write!(f, "\n  * {region}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RegionFailures {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_display() {
        let err = ClientError::Protocol {
            error_type: "KMSAuthValidationError".to_string(),
            message: Some("invalid token".to_string()),
        };
        assert_eq!(err.to_string(), "bless error: KMSAuthValidationError: invalid token");

        let err = ClientError::Protocol {
            error_type: "Throttled".to_string(),
            message: None,
        };
        assert_eq!(err.to_string(), "bless error: Throttled");
    }

    #[test]
    fn test_region_failures_keep_every_entry() {
        let mut failures = RegionFailures::new();
        failures.push("us-west-2", ClientError::Transport("connection reset".to_string()));
        failures.push(
            "us-east-1",
            ClientError::Protocol {
                error_type: "Boom".to_string(),
                message: None,
            },
        );

        let text = ClientError::AllRegionsFailed(failures).to_string();
        assert!(text.starts_with("2 region(s) failed:"));
        assert!(text.contains("us-west-2: connection reset"));
        assert!(text.contains("us-east-1: bless error: Boom"));
    }

    #[test]
    fn test_region_scoping() {
        assert!(ClientError::Transport("x".into()).is_region_scoped());
        assert!(ClientError::InvalidResponse("x".into()).is_region_scoped());
        assert!(!ClientError::Config("x".into()).is_region_scoped());
        assert!(!ClientError::LoginRequired.is_region_scoped());
        assert!(!ClientError::Cancelled(Interrupted::Cancelled).is_region_scoped());
    }

    #[test]
    fn test_lower_errors_map_to_kinds() {
        let kms = KmsAuthError::Kms {
            operation: "encrypt",
            message: "throttled".into(),
        };
        assert_eq!(ClientError::from(kms).kind(), ErrorKind::Transport);
        assert_eq!(
            ClientError::from(AwsError::LoginRequired).kind(),
            ErrorKind::LoginRequired
        );
        assert_eq!(
            ClientError::from(KmsAuthError::Interrupted(Interrupted::DeadlineExceeded)).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            ClientError::from(SshError::NoAgentSocket).kind(),
            ErrorKind::Config
        );
    }
}
