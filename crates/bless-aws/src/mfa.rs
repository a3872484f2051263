// ABOUTME: MFA-gated session credentials with a file cache.
// ABOUTME: Cache hit returns immediately; otherwise prompt for a code and call STS, unless non-interactive.

use crate::credentials::{CredentialSource, Credentials};
use crate::error::{AwsError, Result};
use crate::identity::{IdentityService, SessionTokenService};
use async_trait::async_trait;
use bless_core::{Clock, JsonCache, RequestContext, SystemClock};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

/// Session lifetime requested from STS: 18 hours.
pub const DEFAULT_SESSION_SECS: i32 = 64_800;

/// Cached credentials this close to expiry are treated as expired.
pub const EXPIRY_WINDOW_SECS: i64 = 30;

/// Reads a one-time MFA code from the user.
pub type MfaPrompt = Arc<dyn Fn() -> std::io::Result<String> + Send + Sync>;

/// Whether the provider may stop and ask the user for an MFA code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactivity {
    Interactive,
    /// Stdin may belong to ssh; never prompt.
    NonInteractive,
}

pub struct MfaCredentialProvider {
    cache: JsonCache<Credentials>,
    identity: Arc<dyn IdentityService>,
    sts: Arc<dyn SessionTokenService>,
    prompt: MfaPrompt,
    interactivity: Interactivity,
    session_secs: i32,
    clock: Arc<dyn Clock>,
}

impl MfaCredentialProvider {
    pub fn new(
        cache: JsonCache<Credentials>,
        identity: Arc<dyn IdentityService>,
        sts: Arc<dyn SessionTokenService>,
        prompt: MfaPrompt,
        interactivity: Interactivity,
    ) -> Self {
        Self {
            cache,
            identity,
            sts,
            prompt,
            interactivity,
            session_secs: DEFAULT_SESSION_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_session_secs(mut self, session_secs: i32) -> Self {
        self.session_secs = session_secs;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Unexpired cached credentials, if any.
    pub async fn cached(&self) -> Result<Option<Credentials>> {
        let window = Duration::seconds(EXPIRY_WINDOW_SECS);
        let now = self.clock.now();
        Ok(self
            .cache
            .load()
            .await?
            .filter(|creds| creds.is_valid_at(now, window)))
    }

    pub async fn retrieve(&self, ctx: &RequestContext) -> Result<Credentials> {
        if let Some(creds) = self.cached().await? {
            debug!(path = %self.cache.path().display(), "Using cached session credentials");
            return Ok(creds);
        }

        if self.interactivity == Interactivity::NonInteractive {
            return Err(AwsError::LoginRequired);
        }

        let serial = self.identity.mfa_serial(ctx).await?;
        let code = self.read_code(ctx).await?;
        let creds = self
            .sts
            .get_session_token(ctx, &serial, &code, self.session_secs)
            .await?
            .into_credentials("sts GetSessionToken")?;

        self.cache.store(&creds).await?;
        info!(expiration = %creds.expiration, "Obtained new session credentials");
        Ok(creds)
    }

    async fn read_code(&self, ctx: &RequestContext) -> Result<String> {
        let prompt = self.prompt.clone();
        let code = ctx
            .run(tokio::task::spawn_blocking(move || prompt()))
            .await?
            .map_err(|e| AwsError::Prompt(std::io::Error::other(e)))?
            .map_err(AwsError::Prompt)?;
        Ok(code.trim().to_string())
    }
}

#[async_trait]
impl CredentialSource for MfaCredentialProvider {
    async fn credentials(&self, ctx: &RequestContext) -> Result<Credentials> {
        self.retrieve(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::RawCredentials;
    use bless_core::{CacheLock, ManualClock};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeAws {
        serial_calls: AtomicUsize,
        token_calls: AtomicUsize,
        no_device: bool,
        response: Mutex<RawCredentials>,
        seen: Mutex<Vec<(String, String, i32)>>,
    }

    #[async_trait]
    impl IdentityService for FakeAws {
        async fn username(&self, _ctx: &RequestContext) -> Result<String> {
            Ok("alice".to_string())
        }

        async fn mfa_serial(&self, _ctx: &RequestContext) -> Result<String> {
            self.serial_calls.fetch_add(1, Ordering::SeqCst);
            if self.no_device {
                return Err(AwsError::NoMfaDevice);
            }
            Ok("arn:aws:iam::123456789012:mfa/alice".to_string())
        }
    }

    #[async_trait]
    impl SessionTokenService for FakeAws {
        async fn get_session_token(
            &self,
            _ctx: &RequestContext,
            mfa_serial: &str,
            token_code: &str,
            duration_secs: i32,
        ) -> Result<RawCredentials> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                mfa_serial.to_string(),
                token_code.to_string(),
                duration_secs,
            ));
            Ok(self.response.lock().unwrap().clone())
        }

        async fn assume_role(
            &self,
            _ctx: &RequestContext,
            _role_arn: &str,
            _session_name: &str,
        ) -> Result<Credentials> {
            unreachable!("not used by the MFA provider")
        }
    }

    struct Fixture {
        _dir: TempDir,
        path: std::path::PathBuf,
        lock: Arc<CacheLock>,
        aws: Arc<FakeAws>,
        prompts: Arc<AtomicUsize>,
        clock: ManualClock,
    }

    impl Fixture {
        fn new(aws: FakeAws) -> Self {
            let dir = TempDir::new().unwrap();
            let lock = Arc::new(CacheLock::new(dir.path()).unwrap());
            Self {
                path: dir.path().join("session").join("default.json"),
                _dir: dir,
                lock,
                aws: Arc::new(aws),
                prompts: Arc::new(AtomicUsize::new(0)),
                clock: ManualClock::new(Utc::now()),
            }
        }

        fn provider(&self, interactivity: Interactivity) -> MfaCredentialProvider {
            let prompts = self.prompts.clone();
            let prompt: MfaPrompt = Arc::new(move || {
                prompts.fetch_add(1, Ordering::SeqCst);
                Ok("123456\n".to_string())
            });
            MfaCredentialProvider::new(
                JsonCache::new(&self.path, self.lock.clone()),
                self.aws.clone(),
                self.aws.clone(),
                prompt,
                interactivity,
            )
            .with_clock(Arc::new(self.clock.clone()))
        }

        async fn seed(&self, expiration: DateTime<Utc>) -> Credentials {
            let creds = Credentials {
                expiration,
                access_key_id: "ASIACACHED".to_string(),
                secret_access_key: "cached-secret".to_string(),
                session_token: "cached-token".to_string(),
            };
            JsonCache::new(&self.path, self.lock.clone())
                .store(&creds)
                .await
                .unwrap();
            creds
        }
    }

    fn fresh_response(now: DateTime<Utc>) -> RawCredentials {
        RawCredentials {
            access_key_id: Some("ASIANEW".to_string()),
            secret_access_key: Some("new-secret".to_string()),
            session_token: Some("new-token".to_string()),
            expiration: Some(now + Duration::hours(18)),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_prompt_and_network() {
        let fx = Fixture::new(FakeAws::default());
        let cached = fx.seed(fx.clock.now() + Duration::hours(1)).await;

        for interactivity in [Interactivity::Interactive, Interactivity::NonInteractive] {
            let creds = fx
                .provider(interactivity)
                .retrieve(&RequestContext::new())
                .await
                .unwrap();
            assert_eq!(creds, cached);
        }

        assert_eq!(fx.prompts.load(Ordering::SeqCst), 0);
        assert_eq!(fx.aws.serial_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.aws.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_cache_non_interactive_requires_login() {
        let fx = Fixture::new(FakeAws::default());

        let err = fx
            .provider(Interactivity::NonInteractive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AwsError::LoginRequired));
        assert_eq!(fx.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nearly_expired_cache_non_interactive_requires_login() {
        let fx = Fixture::new(FakeAws::default());
        fx.seed(fx.clock.now() + Duration::seconds(EXPIRY_WINDOW_SECS - 5))
            .await;

        let err = fx
            .provider(Interactivity::NonInteractive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AwsError::LoginRequired));
    }

    #[tokio::test]
    async fn test_interactive_miss_prompts_exchanges_and_caches() {
        let fx = Fixture::new(FakeAws::default());
        *fx.aws.response.lock().unwrap() = fresh_response(fx.clock.now());

        let creds = fx
            .provider(Interactivity::Interactive)
            .with_session_secs(3600)
            .retrieve(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(creds.access_key_id, "ASIANEW");
        assert_eq!(fx.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.aws.seen.lock().unwrap()[0],
            (
                "arn:aws:iam::123456789012:mfa/alice".to_string(),
                "123456".to_string(),
                3600
            )
        );

        // A later non-interactive run is served from the cache.
        let again = fx
            .provider(Interactivity::NonInteractive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap();
        assert_eq!(again, creds);
    }

    #[tokio::test]
    async fn test_malformed_exchange_is_error_and_not_cached() {
        let fx = Fixture::new(FakeAws::default());
        let mut response = fresh_response(fx.clock.now());
        response.secret_access_key = None;
        *fx.aws.response.lock().unwrap() = response;

        let err = fx
            .provider(Interactivity::Interactive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AwsError::MalformedCredentials { .. }));
        assert!(!fx.path.exists());
    }

    #[tokio::test]
    async fn test_no_mfa_device_is_error() {
        let fx = Fixture::new(FakeAws {
            no_device: true,
            ..Default::default()
        });

        let err = fx
            .provider(Interactivity::Interactive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AwsError::NoMfaDevice));
        assert_eq!(fx.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_error() {
        let fx = Fixture::new(FakeAws::default());
        std::fs::create_dir_all(fx.path.parent().unwrap()).unwrap();
        std::fs::write(&fx.path, "garbage").unwrap();

        let err = fx
            .provider(Interactivity::Interactive)
            .retrieve(&RequestContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AwsError::Cache(_)));
    }
}
