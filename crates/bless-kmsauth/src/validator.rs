// ABOUTME: Signer-side KMSAuth check: decrypt under the expected context and vet the window.
// ABOUTME: Rejects tokens from keys outside the allow-list or with oversized lifetimes.

use crate::context::AuthContext;
use crate::error::{KmsAuthError, Result};
use crate::kms::Kms;
use crate::token::Token;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bless_core::{Clock, RequestContext, SystemClock};
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;

pub struct TokenValidator {
    auth_keys: HashSet<String>,
    context: AuthContext,
    max_lifetime: Duration,
    kms: Arc<dyn Kms>,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    pub fn new(
        auth_keys: impl IntoIterator<Item = String>,
        context: AuthContext,
        max_lifetime: Duration,
        kms: Arc<dyn Kms>,
    ) -> Self {
        Self {
            auth_keys: auth_keys.into_iter().collect(),
            context,
            max_lifetime,
            kms,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decrypt and check `token_b64`, returning the accepted token.
    pub async fn validate_token(&self, ctx: &RequestContext, token_b64: &str) -> Result<Token> {
        self.context.validate()?;
        let ciphertext = STANDARD.decode(token_b64.trim())?;
        let decrypted = ctx
            .run(self.kms.decrypt(&ciphertext, &self.context.kms_context()))
            .await??;

        if !self.auth_keys.contains(&decrypted.key_id) {
            return Err(KmsAuthError::UnauthorizedKey(decrypted.key_id));
        }

        let token = Token::from_json(&decrypted.plaintext)?;
        token.is_valid(self.clock.now(), self.max_lifetime)?;
        Ok(token)
    }
}
