// ABOUTME: Certificate parsing and the freshness check for installed certificates.
// ABOUTME: A cert is reusable only inside its skew-shrunk window with matching principals and source address.

use crate::error::{Result, SshError};
use chrono::{DateTime, Utc};
use ssh_key::Certificate;

/// Clock drift tolerance applied to both ends of the certificate window.
pub const CERT_TIME_SKEW_SECS: i64 = 30;

/// Critical option restricting the source IPs a certificate may be used from.
pub const SOURCE_ADDRESS: &str = "source-address";

/// Extension the signer stamps on every certificate it issues.
pub const SIGNER_EXTENSION: &str = "ssh-ca-lambda";

/// Parse authorized-key formatted certificate text.
pub fn parse_certificate(bytes: &[u8]) -> Result<Certificate> {
    let text = std::str::from_utf8(bytes).map_err(|_| SshError::CertificateEncoding)?;
    Certificate::from_openssh(text.trim()).map_err(SshError::ParseCertificate)
}

/// What an existing certificate must look like to skip reissuing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
    principals: Vec<String>,
    source_address: String,
    validate_principals: bool,
    skew_secs: i64,
}

impl FreshnessPolicy {
    /// `bastion_ips` is joined with `,` exactly as it is sent to the signer.
    pub fn new(principals: Vec<String>, bastion_ips: &[String]) -> Self {
        Self {
            principals,
            source_address: bastion_ips.join(","),
            validate_principals: true,
            skew_secs: CERT_TIME_SKEW_SECS,
        }
    }

    pub fn validate_principals(mut self, validate: bool) -> Self {
        self.validate_principals = validate;
        self
    }

    pub fn with_skew_secs(mut self, skew_secs: i64) -> Self {
        self.skew_secs = skew_secs;
        self
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    /// Decide freshness from raw certificate bytes.
    ///
    /// No certificate is `Ok(false)`. A certificate that does not parse is an
    /// error: a corrupt or tampered file must surface, not be overwritten.
    pub fn is_fresh(&self, cert: Option<&[u8]>, now: DateTime<Utc>) -> Result<bool> {
        let Some(bytes) = cert else {
            return Ok(false);
        };
        let cert = parse_certificate(bytes)?;
        Ok(self.is_certificate_fresh(&cert, now))
    }

    /// All conditions must hold; any single failure means reissue.
    pub fn is_certificate_fresh(&self, cert: &Certificate, now: DateTime<Utc>) -> bool {
        let now = now.timestamp();
        let valid_after = cert.valid_after() as i64 + self.skew_secs;
        let valid_before = cert.valid_before() as i64 - self.skew_secs;
        let in_window = valid_after < now && now < valid_before;

        let source_matches = cert
            .critical_options()
            .get(SOURCE_ADDRESS)
            .is_some_and(|value| *value == self.source_address);

        let principals_match =
            !self.validate_principals || cert.valid_principals() == self.principals.as_slice();

        in_window && source_matches && principals_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{issue, CertSpec};
    use chrono::Duration;

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy::new(
            vec!["alice".to_string(), "deploy".to_string()],
            &["10.0.0.0/8".to_string(), "192.168.1.1/32".to_string()],
        )
    }

    fn spec(now: DateTime<Utc>) -> CertSpec {
        CertSpec {
            valid_after: now - Duration::minutes(5),
            valid_before: now + Duration::minutes(30),
            principals: vec!["alice".to_string(), "deploy".to_string()],
            source_address: Some("10.0.0.0/8,192.168.1.1/32".to_string()),
            signer_extension: true,
        }
    }

    fn fresh(cert: &Certificate, now: DateTime<Utc>) -> bool {
        policy().is_certificate_fresh(cert, now)
    }

    #[test]
    fn test_no_certificate_is_not_fresh() {
        assert!(!policy().is_fresh(None, Utc::now()).expect("should not error"));
    }

    #[test]
    fn test_unparsable_certificate_is_an_error() {
        let err = policy()
            .is_fresh(Some(b"ssh-ed25519-cert-v01@openssh.com garbage"), Utc::now())
            .expect_err("corrupt cert should fail closed");
        assert!(matches!(err, SshError::ParseCertificate(_)));
    }

    #[test]
    fn test_matching_certificate_is_fresh() {
        let now = Utc::now();
        let cert = issue(&spec(now));
        let text = cert.to_openssh().unwrap();

        assert!(policy().is_fresh(Some(text.as_bytes()), now).unwrap());
    }

    #[test]
    fn test_expiring_within_skew_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.valid_before = now + Duration::seconds(CERT_TIME_SKEW_SECS - 1);
        let cert = issue(&s);

        // still technically valid, but inside the skew margin
        assert!(cert.valid_before() as i64 > now.timestamp());
        assert!(!fresh(&cert, now));
    }

    #[test]
    fn test_not_yet_valid_within_skew_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.valid_after = now - Duration::seconds(10);
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_expired_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.valid_after = now - Duration::hours(2);
        s.valid_before = now - Duration::hours(1);
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_wrong_source_address_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.source_address = Some("0.0.0.0/0".to_string());
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_missing_source_address_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.source_address = None;
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_principal_mismatch_is_not_fresh() {
        let now = Utc::now();
        let mut s = spec(now);
        s.principals = vec!["alice".to_string()];
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_principal_order_matters() {
        let now = Utc::now();
        let mut s = spec(now);
        s.principals = vec!["deploy".to_string(), "alice".to_string()];
        assert!(!fresh(&issue(&s), now));
    }

    #[test]
    fn test_principal_check_can_be_disabled() {
        let now = Utc::now();
        let mut s = spec(now);
        s.principals = vec!["someone-else".to_string()];
        let cert = issue(&s);

        assert!(policy().validate_principals(false).is_certificate_fresh(&cert, now));
    }
}
