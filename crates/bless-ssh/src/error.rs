// ABOUTME: Error types for SSH key, certificate and agent operations using thiserror.
// ABOUTME: Certificate parse failures are hard errors so a corrupt cert is never silently replaced.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during SSH key and certificate operations.
#[derive(Error, Debug)]
pub enum SshError {
    /// Failed to read a key or certificate file from disk.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an SSH private key.
    #[error("failed to parse SSH key from {path}: {source}")]
    ParseKey {
        path: PathBuf,
        #[source]
        source: ssh_key::Error,
    },

    /// A certificate was present but could not be parsed.
    #[error("could not parse certificate: {0}")]
    ParseCertificate(#[source] ssh_key::Error),

    /// A public key held by the agent could not be parsed.
    #[error("could not parse agent public key: {0}")]
    ParseAgentKey(#[source] ssh_key::Error),

    /// Certificate bytes were not valid UTF-8 text.
    #[error("certificate is not valid authorized-key text")]
    CertificateEncoding,

    /// Failed to generate an SSH key.
    #[error("failed to generate SSH key: {0}")]
    GenerateKey(#[source] ssh_key::Error),

    /// Failed to serialize a key or certificate.
    #[error("failed to serialize key: {0}")]
    SerializeKey(#[source] ssh_key::Error),

    /// Failed to write a key or certificate file to disk.
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set file permissions.
    #[error("failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported key type for the requested operation.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// SSH_AUTH_SOCK is not set.
    #[error("SSH_AUTH_SOCK environment variable empty, is your ssh-agent running?")]
    NoAgentSocket,

    /// Could not connect to the agent socket.
    #[error("could not dial ssh-agent at {path}: {source}")]
    AgentConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate expired before it could be installed.
    #[error("certificate {key_id} has already expired")]
    ExpiredCertificate { key_id: String },

    /// The agent rejected or failed an operation.
    #[error("ssh-agent {operation} failed: {message}")]
    Agent {
        operation: &'static str,
        message: String,
    },
}

/// Result type alias using SshError.
pub type Result<T> = std::result::Result<T, SshError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_read_file_error_display() {
        let err = SshError::ReadFile {
            path: PathBuf::from("/path/to/key-cert.pub"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        let display = err.to_string();
        assert!(display.contains("failed to read"));
        assert!(display.contains("/path/to/key-cert.pub"));
    }

    #[test]
    fn test_parse_key_error_display() {
        let err = SshError::ParseKey {
            path: PathBuf::from("/path/to/invalid_key"),
            source: ssh_key::Error::AlgorithmUnknown,
        };
        let display = err.to_string();
        assert!(display.contains("failed to parse SSH key"));
        assert!(display.contains("/path/to/invalid_key"));
    }

    #[test]
    fn test_parse_certificate_error_display() {
        let err = SshError::ParseCertificate(ssh_key::Error::AlgorithmUnknown);
        assert!(err.to_string().contains("could not parse certificate"));
    }

    #[test]
    fn test_agent_error_display() {
        let err = SshError::Agent {
            operation: "add",
            message: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "ssh-agent add failed: refused");
    }

    #[test]
    fn test_no_agent_socket_display() {
        assert!(SshError::NoAgentSocket.to_string().contains("SSH_AUTH_SOCK"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SshError>();
    }
}
