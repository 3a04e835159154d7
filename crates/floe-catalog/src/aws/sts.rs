//! Account identity via STS `GetCallerIdentity`.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::error::{DisplayErrorContext, SdkError};
use floe_core::AccountId;

use crate::identity::IdentityProvider;
use crate::transport::TransportError;

/// Resolves the caller's account through the AWS SDK STS client.
#[derive(Debug, Clone)]
pub struct StsIdentityProvider {
    client: aws_sdk_sts::Client,
}

impl StsIdentityProvider {
    /// Creates a provider from a loaded SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityProvider for StsIdentityProvider {
    #[tracing::instrument(skip(self))]
    async fn account_identity(&self) -> Result<AccountId, TransportError> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| {
                let status = match &err {
                    SdkError::ServiceError(context) => Some(context.raw().status().as_u16()),
                    _ => None,
                };
                classify(status, DisplayErrorContext(&err).to_string())
            })?;

        let account = output
            .account()
            .ok_or_else(|| TransportError::InvalidResponse {
                message: "GetCallerIdentity response has no Account".into(),
            })?;
        let account = AccountId::new(account).map_err(|e| TransportError::InvalidResponse {
            message: e.to_string(),
        })?;
        tracing::debug!(account = %account, "resolved caller identity");
        Ok(account)
    }
}

/// Maps an STS failure to a transport error. `status` is set when STS
/// answered; anything else never reached the service.
fn classify(status: Option<u16>, message: String) -> TransportError {
    match status {
        Some(401 | 403) => TransportError::Unauthorized { message },
        Some(status) if status >= 500 => TransportError::unavailable(message),
        Some(status) => TransportError::Rejected { status, message },
        None => TransportError::unavailable(message),
    }
}
