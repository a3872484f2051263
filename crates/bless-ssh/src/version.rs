// ABOUTME: Advisory check of the local ssh client against the key type in use.
// ABOUTME: Only ever logs; an odd client or key never stops certificate issuance.

use ssh_key::{Algorithm, PrivateKey};
use std::process::Command;
use tracing::{debug, warn};

/// Output of `ssh -V` (OpenSSH prints it on stderr).
pub fn ssh_client_version() -> std::io::Result<String> {
    let output = Command::new("ssh").arg("-V").output()?;
    let mut version = String::from_utf8_lossy(&output.stderr).into_owned();
    version.push_str(&String::from_utf8_lossy(&output.stdout));
    let version = version.trim().to_string();
    debug!(version = %version, "ssh client version");
    Ok(version)
}

/// Whether `version` is an OpenSSH release known to mishandle RSA certificates.
fn rsa_certificates_unsupported(version: &str) -> bool {
    version.contains("OpenSSH_7.8")
}

/// Log a hint when `key` is unlikely to work with the installed ssh client.
pub fn check_key_type_and_client_version(key: &PrivateKey) {
    let version = match ssh_client_version() {
        Ok(version) => version,
        Err(e) => {
            warn!(error = %e, "Could not deduce ssh client version");
            return;
        }
    };

    if matches!(key.algorithm(), Algorithm::Rsa { .. }) && rsa_certificates_unsupported(&version) {
        debug!(
            version = %version,
            "RSA keys with OpenSSH_7.8 may not be able to authenticate with certificates; \
             consider an ed25519 key"
        );
    }
}
