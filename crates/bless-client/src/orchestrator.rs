// ABOUTME: Certificate request flow: freshness check, credentials, identity, regions in order.
// ABOUTME: The first region to return a certificate wins; other failures are collected.

use crate::config::{Config, RegionConfig};
use crate::error::{ClientError, RegionFailures, Result};
use crate::payload::SigningRequest;
use crate::region::RegionConnector;
use bless_aws::{CredentialSource, Credentials};
use bless_core::{CacheLock, Clock, JsonCache, RequestContext, SystemClock};
use bless_kmsauth::{AuthContext, TokenGenerator};
use bless_ssh::{Certificate, KeyManager, PrivateKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// User type asserted in every kmsauth token.
pub const USER_TYPE: &str = "user";

/// How a run ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// An installed certificate was still good; nothing was requested.
    AlreadyFresh,
    /// A new certificate was issued by `region` and installed.
    Issued {
        region: String,
        certificate: Box<Certificate>,
    },
}

pub struct CertificateRequester {
    config: Arc<Config>,
    credentials: Option<Arc<dyn CredentialSource>>,
    connector: Arc<dyn RegionConnector>,
    lock: Arc<CacheLock>,
    clock: Arc<dyn Clock>,
}

impl CertificateRequester {
    /// `credentials` of `None` signs requests with the default credential chain.
    pub fn new(
        config: Arc<Config>,
        credentials: Option<Arc<dyn CredentialSource>>,
        connector: Arc<dyn RegionConnector>,
        lock: Arc<CacheLock>,
    ) -> Self {
        Self {
            config,
            credentials,
            connector,
            lock,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Obtain and install a certificate unless a fresh one is present.
    ///
    /// `force` skips the freshness check.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        keys: &mut dyn KeyManager,
        force: bool,
    ) -> Result<Outcome> {
        ctx.check()?;
        if !force && keys.has_valid_certificate().await? {
            debug!("Fresh certificate, nothing to do");
            return Ok(Outcome::AlreadyFresh);
        }

        let credentials = match &self.credentials {
            Some(source) => Some(source.credentials(ctx).await?),
            None => None,
        };
        let username = self.username(ctx, credentials.as_ref()).await?;
        let key = keys.get_key().await?;

        let (region, certificate) = self
            .request_certificate(ctx, &username, &key, credentials.as_ref())
            .await?;

        keys.write_key(&key, &certificate).await?;
        match keys.has_valid_certificate().await {
            Ok(true) => {}
            Ok(false) => warn!(region = %region, "Installed certificate is not reported as valid"),
            Err(e) => warn!(region = %region, error = %e, "Could not verify installed certificate"),
        }

        info!(region = %region, key_id = certificate.key_id(), "Installed new certificate");
        Ok(Outcome::Issued {
            region,
            certificate: Box::new(certificate),
        })
    }

    /// Prime the kmsauth cache of the first region without requesting a certificate.
    pub async fn prime_token(&self, ctx: &RequestContext) -> Result<String> {
        let credentials = match &self.credentials {
            Some(source) => Some(source.credentials(ctx).await?),
            None => None,
        };
        let username = self.username(ctx, credentials.as_ref()).await?;
        let region = self
            .config
            .lambda
            .regions
            .first()
            .ok_or_else(|| ClientError::Config("no regions configured".into()))?;

        let clients = self
            .connector
            .connect(ctx, region, credentials.as_ref())
            .await?;
        self.token_generator(region, &username, clients.kms)?
            .get_encrypted_token(ctx)
            .await?;
        Ok(region.aws_region.clone())
    }

    async fn username(&self, ctx: &RequestContext, credentials: Option<&Credentials>) -> Result<String> {
        if let Some(username) = &self.config.client.aws_username {
            debug!(username = %username, "Using username from config");
            return Ok(username.clone());
        }
        let identity = self.connector.identity(credentials).await?;
        Ok(identity.username(ctx).await?)
    }

    /// Try regions in order; stop at the first certificate.
    async fn request_certificate(
        &self,
        ctx: &RequestContext,
        username: &str,
        key: &PrivateKey,
        credentials: Option<&Credentials>,
    ) -> Result<(String, Certificate)> {
        let public_key = key
            .public_key()
            .to_openssh()
            .map_err(|e| ClientError::Validation(format!("could not encode public key: {e}")))?;

        let mut failures = RegionFailures::new();
        for region in &self.config.lambda.regions {
            debug!(region = %region.aws_region, "Attempting to get certificate");
            match self
                .request_from_region(ctx, region, username, &public_key, credentials)
                .await
            {
                Ok(cert) => return Ok((region.aws_region.clone(), cert)),
                Err(e) if e.is_region_scoped() => {
                    warn!(region = %region.aws_region, error = %e, "Region failed, trying next");
                    failures.push(region.aws_region.clone(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::AllRegionsFailed(failures))
    }

    async fn request_from_region(
        &self,
        ctx: &RequestContext,
        region: &RegionConfig,
        username: &str,
        public_key: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Certificate> {
        let clients = self.connector.connect(ctx, region, credentials).await?;
        let token = self
            .token_generator(region, username, clients.kms)?
            .get_encrypted_token(ctx)
            .await?;

        let request = SigningRequest::new(
            username,
            &self.config.remote_users(username),
            &self.config.client.bastion_ips,
            public_key.to_string(),
            &token,
        );
        clients.signer.sign(ctx, &request).await
    }

    fn token_generator(
        &self,
        region: &RegionConfig,
        username: &str,
        kms: Arc<dyn bless_kmsauth::Kms>,
    ) -> Result<TokenGenerator> {
        let context = AuthContext::v2(username, &self.config.lambda.function_name, USER_TYPE);
        let cache = JsonCache::new(
            self.config.kmsauth_cache_path(&region.aws_region)?,
            self.lock.clone(),
        );
        Ok(TokenGenerator::new(region.kms_auth_key_id.clone(), context, kms)?
            .with_lifetime(self.config.token_lifetime())
            .with_cache(cache)
            .with_clock(self.clock.clone()))
    }
}
