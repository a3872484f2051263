// ABOUTME: Builds KMSAuth tokens, reusing a cached ciphertext while it is still good.
// ABOUTME: A cache hit needs the same context map and a token not yet within skew of expiry.

use crate::context::AuthContext;
use crate::error::Result;
use crate::kms::Kms;
use crate::token::{EncryptedToken, Token, TokenCacheEntry};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bless_core::{Clock, JsonCache, RequestContext, SystemClock};
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

/// Default token lifetime: one hour.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

pub struct TokenGenerator {
    auth_key: String,
    context: AuthContext,
    lifetime: Duration,
    kms: Arc<dyn Kms>,
    cache: Option<JsonCache<TokenCacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl TokenGenerator {
    /// `auth_key` is the KMS key id, ARN or alias tokens are encrypted under.
    pub fn new(auth_key: impl Into<String>, context: AuthContext, kms: Arc<dyn Kms>) -> Result<Self> {
        context.validate()?;
        Ok(Self {
            auth_key: auth_key.into(),
            context,
            lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            kms,
            cache: None,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_cache(mut self, cache: JsonCache<TokenCacheEntry>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Username the signer will attribute the token to.
    pub fn username(&self) -> String {
        self.context.username()
    }

    /// Return a cached ciphertext when usable, otherwise encrypt and cache a new token.
    ///
    /// A missing cache file is a miss; a corrupt one is an error.
    pub async fn get_encrypted_token(&self, ctx: &RequestContext) -> Result<EncryptedToken> {
        let kms_context = self.context.kms_context();

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.load().await? {
                if entry.matches(&kms_context, self.clock.now()) {
                    debug!(path = %cache.path().display(), "Using cached kmsauth token");
                    return Ok(entry.encrypted_token);
                }
                debug!(path = %cache.path().display(), "Cached kmsauth token not reusable");
            }
        }

        let token = Token::new(self.clock.now(), self.lifetime);
        let plaintext = token.to_json()?;
        let ciphertext = ctx
            .run(self.kms.encrypt(&self.auth_key, &plaintext, &kms_context))
            .await??;
        let encrypted_token = EncryptedToken::new(STANDARD.encode(ciphertext));
        debug!(
            len = encrypted_token.as_str().len(),
            not_after = %token.not_after,
            "Encrypted new kmsauth token"
        );

        if let Some(cache) = &self.cache {
            cache
                .store(&TokenCacheEntry {
                    token,
                    encrypted_token: encrypted_token.clone(),
                    auth_context: kms_context,
                })
                .await?;
        }

        Ok(encrypted_token)
    }
}
