// ABOUTME: Synchronous invocation of the signing Lambda function.
// ABOUTME: Returns the raw response payload; interpreting it is the caller's job.

use crate::error::{sdk_error, AwsError, Result};
use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{InvocationType, LogType};
use bless_core::RequestContext;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
    function_name: String,
    qualifier: Option<String>,
}

impl LambdaInvoker {
    pub fn new(config: &SdkConfig, function_name: impl Into<String>, qualifier: Option<String>) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
            function_name: function_name.into(),
            qualifier,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Invoke with `payload` and wait for the function's response body.
    pub async fn invoke(&self, ctx: &RequestContext, payload: Vec<u8>) -> Result<Vec<u8>> {
        debug!(
            function = %self.function_name,
            qualifier = ?self.qualifier,
            "Invoking signing function"
        );
        let request = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .set_qualifier(self.qualifier.clone())
            .invocation_type(InvocationType::RequestResponse)
            .log_type(LogType::Tail)
            .payload(Blob::new(payload));
        let output = ctx
            .run(request.send())
            .await?
            .map_err(|e| sdk_error("lambda", "Invoke", e))?;

        if let Some(function_error) = output.function_error() {
            // The payload still carries errorType/errorMessage.
            warn!(function = %self.function_name, function_error, "Signing function reported an error");
        }

        output
            .payload()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or(AwsError::EmptyResponse("lambda Invoke"))
    }
}
