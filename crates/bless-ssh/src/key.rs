// ABOUTME: SSH key and certificate files on disk.
// ABOUTME: Handles the <name>, <name>.pub, <name>-cert.pub triple and ephemeral key creation.

use crate::error::{Result, SshError};
use ssh_key::{Algorithm, Certificate, LineEnding, PrivateKey};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

/// Generate a fresh in-memory ed25519 key pair. Never written to disk.
pub fn generate_ephemeral_key() -> Result<PrivateKey> {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).map_err(SshError::GenerateKey)
}

/// Paths of one key triple, derived from the private key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    private: PathBuf,
}

impl KeyFiles {
    pub fn new(private_key_path: &Path) -> Self {
        Self {
            private: private_key_path.to_path_buf(),
        }
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private
    }

    /// `<name>.pub`
    pub fn public_key_path(&self) -> PathBuf {
        self.sibling(".pub")
    }

    /// `<name>-cert.pub`
    pub fn certificate_path(&self) -> PathBuf {
        self.sibling("-cert.pub")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .private
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.private.with_file_name(name)
    }

    /// Load the existing private key.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_key(&self) -> Result<PrivateKey> {
        let key_data = std::fs::read_to_string(&self.private).map_err(|e| SshError::ReadFile {
            path: self.private.clone(),
            source: e,
        })?;

        PrivateKey::from_openssh(&key_data).map_err(|e| SshError::ParseKey {
            path: self.private.clone(),
            source: e,
        })
    }

    /// Generate a new ed25519 key pair and save both halves.
    ///
    /// Creates the parent directory if needed. Sets Unix permissions to 0600
    /// on the private key.
    pub fn generate_key(&self) -> Result<PrivateKey> {
        debug!(path = %self.private.display(), "Generating new SSH key");

        if let Some(parent) = self.private.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SshError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let private_key = generate_ephemeral_key()?;

        let private_key_str = private_key
            .to_openssh(LineEnding::LF)
            .map_err(SshError::SerializeKey)?;
        write_file(&self.private, private_key_str.as_bytes())?;
        set_mode(&self.private, 0o600)?;

        let public_key_str = private_key
            .public_key()
            .to_openssh()
            .map_err(SshError::SerializeKey)?;
        write_file(&self.public_key_path(), public_key_str.as_bytes())?;

        Ok(private_key)
    }

    /// Load the private key, generating a new pair if it does not exist yet.
    pub fn load_or_generate_key(&self) -> Result<PrivateKey> {
        if self.private.exists() {
            self.load_key()
        } else {
            self.generate_key()
        }
    }

    /// Raw certificate bytes, or None when no certificate has been issued yet.
    pub fn read_certificate(&self) -> Result<Option<Vec<u8>>> {
        let path = self.certificate_path();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SshError::ReadFile { path, source: e }),
        }
    }

    /// Replace the certificate file with `cert` in authorized-key format.
    pub fn write_certificate(&self, cert: &Certificate) -> Result<()> {
        let path = self.certificate_path();
        let encoded = cert.to_openssh().map_err(SshError::SerializeKey)?;
        debug!(path = %path.display(), "Writing certificate");
        write_file(&path, format!("{encoded}\n").as_bytes())?;
        set_mode(&path, 0o644)
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|e| SshError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        SshError::SetPermissions {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
