// ABOUTME: Per-region client construction for KMS and the signer.
// ABOUTME: RegionConnector is the seam tests use to script regional outcomes.

use crate::config::{Config, RegionConfig};
use crate::error::Result;
use crate::signer::{LambdaSigner, Signer};
use async_trait::async_trait;
use bless_aws::{
    with_credentials, with_region, AwsIdentity, AwsKms, Credentials, IdentityService,
    LambdaInvoker, SdkConfig, SessionTokenService,
};
use bless_core::RequestContext;
use bless_kmsauth::Kms;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Session name recorded in CloudTrail for the assumed signing role.
const ROLE_SESSION_NAME: &str = "blessclient";

/// Clients bound to one region.
#[derive(Clone)]
pub struct RegionClients {
    pub kms: Arc<dyn Kms>,
    pub signer: Arc<dyn Signer>,
}

#[async_trait]
pub trait RegionConnector: Send + Sync {
    /// Identity lookups made with `credentials`, or the default chain when `None`.
    async fn identity(&self, credentials: Option<&Credentials>) -> Result<Arc<dyn IdentityService>>;

    /// Clients for `region`.
    async fn connect(
        &self,
        ctx: &RequestContext,
        region: &RegionConfig,
        credentials: Option<&Credentials>,
    ) -> Result<RegionClients>;
}

/// Builds real AWS clients from a base SDK config.
pub struct AwsRegionConnector {
    base: SdkConfig,
    function_name: String,
    qualifier: Option<String>,
    role_arn: Option<String>,
    assumed: Mutex<Option<Credentials>>,
}

impl AwsRegionConnector {
    pub fn new(base: SdkConfig, config: &Config) -> Self {
        Self {
            base,
            function_name: config.lambda.function_name.clone(),
            qualifier: config.lambda.function_version.clone(),
            role_arn: config.lambda.role_arn.clone(),
            assumed: Mutex::new(None),
        }
    }

    fn user_config(&self, credentials: Option<&Credentials>) -> SdkConfig {
        match credentials {
            Some(creds) => with_credentials(&self.base, creds),
            None => self.base.clone(),
        }
    }

    /// Config for invoking the signer, assuming the role once per run.
    async fn signer_config(&self, ctx: &RequestContext, regional: &SdkConfig) -> Result<SdkConfig> {
        let Some(role_arn) = &self.role_arn else {
            return Ok(regional.clone());
        };

        let mut assumed = self.assumed.lock().await;
        let creds = match assumed.as_ref() {
            Some(creds) => creds.clone(),
            None => {
                debug!(role_arn = %role_arn, "Assuming signing role");
                let creds = AwsIdentity::new(regional)
                    .assume_role(ctx, role_arn, ROLE_SESSION_NAME)
                    .await?;
                *assumed = Some(creds.clone());
                creds
            }
        };
        Ok(with_credentials(regional, &creds))
    }
}

#[async_trait]
impl RegionConnector for AwsRegionConnector {
    async fn identity(&self, credentials: Option<&Credentials>) -> Result<Arc<dyn IdentityService>> {
        Ok(Arc::new(AwsIdentity::new(&self.user_config(credentials))))
    }

    async fn connect(
        &self,
        ctx: &RequestContext,
        region: &RegionConfig,
        credentials: Option<&Credentials>,
    ) -> Result<RegionClients> {
        let regional = with_region(&self.user_config(credentials), &region.aws_region);
        let signer_config = self.signer_config(ctx, &regional).await?;

        Ok(RegionClients {
            kms: Arc::new(AwsKms::new(&regional)),
            signer: Arc::new(LambdaSigner::new(LambdaInvoker::new(
                &signer_config,
                self.function_name.clone(),
                self.qualifier.clone(),
            ))),
        })
    }
}
