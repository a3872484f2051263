// ABOUTME: Caller identity lookups (IAM) and credential exchanges (STS).
// ABOUTME: Traits keep the MFA provider and orchestrator testable without AWS.

use crate::credentials::{Credentials, RawCredentials};
use crate::error::{sdk_error, AwsError, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use bless_core::RequestContext;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Who the current credentials belong to.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// IAM user name of the caller.
    async fn username(&self, ctx: &RequestContext) -> Result<String>;

    /// Serial (ARN) of the caller's MFA device.
    async fn mfa_serial(&self, ctx: &RequestContext) -> Result<String>;
}

/// STS exchanges for temporary credentials.
#[async_trait]
pub trait SessionTokenService: Send + Sync {
    /// Trade an MFA code for session credentials valid `duration_secs`.
    async fn get_session_token(
        &self,
        ctx: &RequestContext,
        mfa_serial: &str,
        token_code: &str,
        duration_secs: i32,
    ) -> Result<RawCredentials>;

    /// Assume `role_arn` with the current credentials.
    async fn assume_role(
        &self,
        ctx: &RequestContext,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials>;
}

/// IAM and STS clients sharing one SDK config.
#[derive(Debug, Clone)]
pub struct AwsIdentity {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsIdentity {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

fn to_chrono(time: &aws_sdk_sts::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn raw_from_sts(creds: Option<&aws_sdk_sts::types::Credentials>) -> RawCredentials {
    match creds {
        Some(c) => RawCredentials {
            access_key_id: Some(c.access_key_id().to_string()),
            secret_access_key: Some(c.secret_access_key().to_string()),
            session_token: Some(c.session_token().to_string()),
            expiration: to_chrono(c.expiration()),
        },
        None => RawCredentials::default(),
    }
}

#[async_trait]
impl IdentityService for AwsIdentity {
    async fn username(&self, ctx: &RequestContext) -> Result<String> {
        let output = ctx
            .run(self.iam.get_user().send())
            .await?
            .map_err(|e| sdk_error("iam", "GetUser", e))?;

        let name = output
            .user()
            .map(|u| u.user_name().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(AwsError::EmptyResponse("iam GetUser"))?;
        debug!(username = %name, "Resolved IAM user");
        Ok(name)
    }

    async fn mfa_serial(&self, ctx: &RequestContext) -> Result<String> {
        let mut serials = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let request = self.iam.list_mfa_devices().set_marker(marker.take());
            let output = ctx
                .run(request.send())
                .await?
                .map_err(|e| sdk_error("iam", "ListMFADevices", e))?;

            serials.extend(
                output
                    .mfa_devices()
                    .iter()
                    .map(|d| d.serial_number().to_string())
                    .filter(|s| !s.is_empty()),
            );

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        // Any device works; use the first.
        serials.into_iter().next().ok_or(AwsError::NoMfaDevice)
    }
}

#[async_trait]
impl SessionTokenService for AwsIdentity {
    async fn get_session_token(
        &self,
        ctx: &RequestContext,
        mfa_serial: &str,
        token_code: &str,
        duration_secs: i32,
    ) -> Result<RawCredentials> {
        let request = self
            .sts
            .get_session_token()
            .duration_seconds(duration_secs)
            .serial_number(mfa_serial)
            .token_code(token_code);
        let output = ctx
            .run(request.send())
            .await?
            .map_err(|e| sdk_error("sts", "GetSessionToken", e))?;
        Ok(raw_from_sts(output.credentials()))
    }

    async fn assume_role(
        &self,
        ctx: &RequestContext,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials> {
        let request = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name);
        let output = ctx
            .run(request.send())
            .await?
            .map_err(|e| sdk_error("sts", "AssumeRole", e))?;
        debug!(role_arn, "Assumed role");
        raw_from_sts(output.credentials()).into_credentials("sts AssumeRole")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sts_credentials_are_all_none() {
        let raw = raw_from_sts(None);
        assert!(matches!(
            raw.into_credentials("sts GetSessionToken"),
            Err(AwsError::MalformedCredentials {
                field: "access_key_id",
                ..
            })
        ));
    }

    #[test]
    fn test_sts_credentials_convert() {
        let expiration = aws_sdk_sts::primitives::DateTime::from_secs(1_700_000_000);
        let sts = aws_sdk_sts::types::Credentials::builder()
            .access_key_id("ASIAEXAMPLE")
            .secret_access_key("secret")
            .session_token("token")
            .expiration(expiration)
            .build()
            .unwrap();

        let creds = raw_from_sts(Some(&sts)).into_credentials("test").unwrap();
        assert_eq!(creds.expiration.timestamp(), 1_700_000_000);
        assert_eq!(creds.session_token, "token");
    }
}
