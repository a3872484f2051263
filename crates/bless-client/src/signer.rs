// ABOUTME: The remote signer capability and its Lambda implementation.
// ABOUTME: Turns a signing request into a parsed certificate or a region-scoped error.

use crate::error::{ClientError, Result};
use crate::payload::{SigningRequest, SigningResponse};
use async_trait::async_trait;
use bless_aws::LambdaInvoker;
use bless_core::RequestContext;
use bless_ssh::{parse_certificate, Certificate};
use tracing::debug;

#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, ctx: &RequestContext, request: &SigningRequest) -> Result<Certificate>;
}

/// Parse signer output into a certificate.
pub(crate) fn certificate_from_response(bytes: &[u8]) -> Result<Certificate> {
    let text = SigningResponse::from_json(bytes)?.into_certificate()?;
    parse_certificate(text.as_bytes())
        .map_err(|e| ClientError::InvalidResponse(format!("unparsable certificate: {e}")))
}

/// Signs by invoking the bless Lambda function.
pub struct LambdaSigner {
    invoker: LambdaInvoker,
}

impl LambdaSigner {
    pub fn new(invoker: LambdaInvoker) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Signer for LambdaSigner {
    async fn sign(&self, ctx: &RequestContext, request: &SigningRequest) -> Result<Certificate> {
        let payload = request.to_json()?;
        let response = self.invoker.invoke(ctx, payload).await?;
        debug!(
            function = self.invoker.function_name(),
            len = response.len(),
            "Received signer response"
        );
        certificate_from_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_garbage_certificate_is_protocol_error() {
        let err =
            certificate_from_response(br#"{"certificate":"ssh-ed25519-cert-v01@openssh.com AAAA"}"#)
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.is_region_scoped());
    }

    #[test]
    fn test_error_type_wins_over_certificate() {
        let err = certificate_from_response(
            br#"{"certificate":"x","errorType":"Denied","errorMessage":"nope"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Protocol { .. }));
    }
}
