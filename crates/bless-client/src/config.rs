// ABOUTME: TOML configuration for blessclient and derived paths.
// ABOUTME: Validated before any credential or network work starts.

use crate::error::{ClientError, Result};
use bless_ssh::expand_path;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key of the versioned cache subdirectory.
const CACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client: ClientConfig,
    pub lambda: LambdaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// AWS profile of an IAM user (not a role). Unset uses the default chain.
    #[serde(default)]
    pub aws_user_profile: Option<String>,

    /// Skips the IAM lookup when set.
    #[serde(default)]
    pub aws_username: Option<String>,

    /// Key triple location when not using the agent.
    #[serde(default = "default_ssh_private_key")]
    pub ssh_private_key: String,

    /// Install an ephemeral key into ssh-agent instead of writing files.
    #[serde(default = "default_true")]
    pub update_ssh_agent: bool,

    /// Principals to request. Empty means just the caller's username.
    #[serde(default)]
    pub remote_users: Vec<String>,

    /// Source addresses the certificate is restricted to.
    #[serde(default)]
    pub bastion_ips: Vec<String>,

    #[serde(default)]
    pub validate_principals: Option<bool>,

    /// Gate the profile's credentials behind an STS MFA session.
    #[serde(default = "default_true")]
    pub use_mfa: bool,

    #[serde(default = "default_token_lifetime")]
    pub kmsauth_token_lifetime_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_mfa_session")]
    pub mfa_session_secs: i32,

    #[serde(default)]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LambdaConfig {
    pub function_name: String,

    /// Alias or version qualifier.
    #[serde(default)]
    pub function_version: Option<String>,

    /// Role assumed before invoking the function.
    #[serde(default)]
    pub role_arn: Option<String>,

    /// Tried in order; the first is preferred.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegionConfig {
    pub aws_region: String,
    /// Region-local KMS key used for kmsauth.
    pub kms_auth_key_id: String,
}

fn default_ssh_private_key() -> String {
    "~/.ssh/blessclient".to_string()
}

fn default_true() -> bool {
    true
}

fn default_token_lifetime() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    120
}

fn default_mfa_session() -> i32 {
    64_800
}

/// Longest kmsauth token the client will mint.
const MAX_TOKEN_LIFETIME_SECS: u64 = 12 * 60 * 60;

/// Longest wall-clock budget for one invocation.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

// STS GetSessionToken bounds for IAM users.
const MFA_SESSION_RANGE: std::ops::RangeInclusive<i32> = 900..=129_600;

/// `$XDG_CONFIG_HOME/blessclient`, falling back to `~/.config/blessclient` on every platform.
fn config_root() -> Option<PathBuf> {
    config_root_from(std::env::var_os("XDG_CONFIG_HOME"), dirs::home_dir())
}

fn config_root_from(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    // XDG says relative values are to be ignored.
    let base = xdg_config_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| home.map(|h| h.join(".config")))?;
    Some(base.join("blessclient"))
}

impl Config {
    /// `$XDG_CONFIG_HOME/blessclient/config.toml`, default `~/.config/blessclient/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        config_root().map(|d| d.join("config.toml"))
    }

    /// Load and validate configuration from `path` or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()
                .ok_or_else(|| ClientError::Config("could not determine config path".into()))?,
        };
        debug!(path = %path.display(), "Loading config");

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ClientError::Config(format!("failed to read config from {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lambda.function_name.is_empty() {
            return Err(ClientError::Config("lambda.function_name is required".into()));
        }
        if self.lambda.regions.is_empty() {
            return Err(ClientError::Config(
                "lambda.regions must list at least one region".into(),
            ));
        }
        for (i, region) in self.lambda.regions.iter().enumerate() {
            if region.aws_region.is_empty() {
                return Err(ClientError::Config(format!(
                    "lambda.regions[{i}].aws_region is required"
                )));
            }
            if region.kms_auth_key_id.is_empty() {
                return Err(ClientError::Config(format!(
                    "lambda.regions[{i}].kms_auth_key_id is required"
                )));
            }
        }
        if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&self.client.kmsauth_token_lifetime_secs) {
            return Err(ClientError::Config(format!(
                "client.kmsauth_token_lifetime_secs must be between 1 and {MAX_TOKEN_LIFETIME_SECS}"
            )));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.client.request_timeout_secs) {
            return Err(ClientError::Config(format!(
                "client.request_timeout_secs must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"
            )));
        }
        if !MFA_SESSION_RANGE.contains(&self.client.mfa_session_secs) {
            return Err(ClientError::Config(format!(
                "client.mfa_session_secs must be between {} and {}",
                MFA_SESSION_RANGE.start(),
                MFA_SESSION_RANGE.end()
            )));
        }
        if !self.client.update_ssh_agent && self.client.ssh_private_key.is_empty() {
            return Err(ClientError::Config(
                "client.ssh_private_key is required when update_ssh_agent is false".into(),
            ));
        }
        Ok(())
    }

    /// Principals to request for `username`.
    pub fn remote_users(&self, username: &str) -> Vec<String> {
        if self.client.remote_users.is_empty() {
            vec![username.to_string()]
        } else {
            self.client.remote_users.clone()
        }
    }

    pub fn validate_principals(&self) -> bool {
        self.client.validate_principals.unwrap_or(true)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::seconds(self.client.kmsauth_token_lifetime_secs as i64)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.client.request_timeout_secs)
    }

    pub fn ssh_private_key_path(&self) -> PathBuf {
        expand_path(&self.client.ssh_private_key)
    }

    /// Cache root, versioned so an upgrade never reads an older layout.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let root = match &self.client.cache_dir {
            Some(dir) => expand_path(dir),
            None => config_root()
                .map(|d| d.join("cache"))
                .ok_or_else(|| ClientError::Config("could not determine cache dir".into()))?,
        };
        Ok(root.join(CACHE_VERSION))
    }

    /// kmsauth tokens are per region since each region has its own key.
    pub fn kmsauth_cache_path(&self, region: &str) -> Result<PathBuf> {
        Ok(self
            .cache_dir()?
            .join("kmsauth")
            .join(format!("{region}.json")))
    }

    pub fn session_cache_path(&self) -> Result<PathBuf> {
        let profile = self.client.aws_user_profile.as_deref().unwrap_or("default");
        Ok(self
            .cache_dir()?
            .join("session")
            .join(format!("{profile}.json")))
    }
}
