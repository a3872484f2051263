// ABOUTME: SDK configuration loading for a profile and per-region client configs.
// ABOUTME: Session credentials from the MFA provider replace the profile chain when present.

use crate::credentials::Credentials;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use std::time::SystemTime;

/// Load the default credential chain, optionally pinned to a named profile.
pub async fn load_base_config(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// Same config, different region.
pub fn with_region(base: &SdkConfig, region: &str) -> SdkConfig {
    base.to_builder()
        .region(Region::new(region.to_string()))
        .build()
}

/// Same config, but signing with fixed session credentials.
pub fn with_credentials(base: &SdkConfig, credentials: &Credentials) -> SdkConfig {
    let expires: SystemTime = credentials.expiration.into();
    let static_credentials = aws_credential_types::Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        Some(credentials.session_token.clone()),
        Some(expires),
        "blessclient",
    );
    base.to_builder()
        .credentials_provider(SharedCredentialsProvider::new(static_credentials))
        .build()
}
