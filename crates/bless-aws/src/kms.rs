// ABOUTME: AWS KMS implementation of the kmsauth Kms capability.
// ABOUTME: Encryption context is passed through verbatim as KMS associated data.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use bless_kmsauth::{Decrypted, Kms, KmsAuthError, KmsContext};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AwsKms {
    client: aws_sdk_kms::Client,
}

impl AwsKms {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_kms::Client::new(config),
        }
    }
}

fn kms_error(operation: &'static str, err: impl std::error::Error) -> KmsAuthError {
    KmsAuthError::Kms {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn empty(operation: &'static str, field: &str) -> KmsAuthError {
    KmsAuthError::Kms {
        operation,
        message: format!("response contained no {field}"),
    }
}

fn context_map(context: &KmsContext) -> HashMap<String, String> {
    context.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl Kms for AwsKms {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &KmsContext,
    ) -> bless_kmsauth::Result<Vec<u8>> {
        let output = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext))
            .set_encryption_context(Some(context_map(context)))
            .send()
            .await
            .map_err(|e| kms_error("encrypt", e))?;

        output
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| empty("encrypt", "ciphertext"))
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &KmsContext,
    ) -> bless_kmsauth::Result<Decrypted> {
        let output = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .set_encryption_context(Some(context_map(context)))
            .send()
            .await
            .map_err(|e| kms_error("decrypt", e))?;

        let plaintext = output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| empty("decrypt", "plaintext"))?;
        let key_id = output
            .key_id()
            .map(str::to_string)
            .ok_or_else(|| empty("decrypt", "key id"))?;
        Ok(Decrypted { plaintext, key_id })
    }
}
