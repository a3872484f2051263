// ABOUTME: JSON request and response bodies of the signing function.
// ABOUTME: The response is either a certificate or an errorType/errorMessage pair.

use crate::error::{ClientError, Result};
use bless_kmsauth::EncryptedToken;
use serde::{Deserialize, Serialize};

/// The signer checks the caller's address against this; blessclient allows any.
pub const BASTION_USER_IP: &str = "0.0.0.0/0";

/// Certificates are not restricted to a forced command.
pub const COMMAND_WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub bastion_user: String,
    /// Comma separated principals.
    pub remote_usernames: String,
    /// Comma separated source addresses.
    pub bastion_ips: String,
    pub bastion_user_ip: String,
    pub command: String,
    /// Authorized-key formatted public key.
    pub public_key_to_sign: String,
    pub kmsauth_token: String,
}

impl SigningRequest {
    pub fn new(
        username: &str,
        remote_users: &[String],
        bastion_ips: &[String],
        public_key: String,
        token: &EncryptedToken,
    ) -> Self {
        Self {
            bastion_user: username.to_string(),
            remote_usernames: remote_users.join(","),
            bastion_ips: bastion_ips.join(","),
            bastion_user_ip: BASTION_USER_IP.to_string(),
            command: COMMAND_WILDCARD.to_string(),
            public_key_to_sign: public_key,
            kmsauth_token: token.as_str().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ClientError::Validation(format!("could not serialize signing request: {e}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SigningResponse {
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl SigningResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ClientError::InvalidResponse(format!("could not deserialize response: {e}")))
    }

    /// The certificate text, or the structured error the signer reported.
    pub fn into_certificate(self) -> Result<String> {
        if let Some(error_type) = self.error_type {
            return Err(ClientError::Protocol {
                error_type,
                message: self.error_message,
            });
        }
        match self.certificate {
            Some(cert) if !cert.trim().is_empty() => Ok(cert),
            _ => Err(ClientError::InvalidResponse("no certificate in response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_request_fields() {
        let token = EncryptedToken::new("dG9rZW4=");
        let request = SigningRequest::new(
            "alice",
            &["alice".to_string(), "deploy".to_string()],
            &["10.0.0.0/8".to_string(), "192.168.1.1/32".to_string()],
            "ssh-ed25519 AAAA".to_string(),
            &token,
        );

        let json: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["bastion_user"], "alice");
        assert_eq!(json["remote_usernames"], "alice,deploy");
        assert_eq!(json["bastion_ips"], "10.0.0.0/8,192.168.1.1/32");
        assert_eq!(json["bastion_user_ip"], "0.0.0.0/0");
        assert_eq!(json["command"], "*");
        assert_eq!(json["public_key_to_sign"], "ssh-ed25519 AAAA");
        assert_eq!(json["kmsauth_token"], "dG9rZW4=");
    }

    #[test]
    fn test_certificate_response() {
        let response =
            SigningResponse::from_json(br#"{"certificate":"ssh-ed25519-cert-v01@openssh.com AAAA"}"#)
                .unwrap();
        assert_eq!(
            response.into_certificate().unwrap(),
            "ssh-ed25519-cert-v01@openssh.com AAAA"
        );
    }

    #[test]
    fn test_error_response_is_protocol_error() {
        let response = SigningResponse::from_json(
            br#"{"errorType":"KMSAuthValidationError","errorMessage":"Invalid token"}"#,
        )
        .unwrap();
        let err = response.into_certificate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.to_string(), "bless error: KMSAuthValidationError: Invalid token");
    }

    #[test]
    fn test_empty_response_has_no_certificate() {
        let err = SigningResponse::from_json(b"{}")
            .unwrap()
            .into_certificate()
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid signer response: no certificate in response");
    }

    #[test]
    fn test_non_json_response() {
        let err = SigningResponse::from_json(b"Internal Server Error").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
