//! `SigV4` request signing with `aws-sigv4`.

use std::time::SystemTime;

use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;

use crate::transport::TransportError;

/// Signs requests for one service in one region.
///
/// Credentials are fetched from the provider on every request, so rotated
/// or refreshed credentials are picked up without rebuilding the signer.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: SharedCredentialsProvider,
    region: String,
    service: String,
}

impl RequestSigner {
    /// Creates a signer.
    #[must_use]
    pub fn new(
        credentials: SharedCredentialsProvider,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Returns the signing region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the signing service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Computes the headers to add to a request: `authorization`,
    /// `x-amz-date` and, for temporary credentials, `x-amz-security-token`.
    ///
    /// `headers` must contain every header that will be sent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unauthorized`] if no credentials can be
    /// resolved, and [`TransportError::Rejected`] if the request cannot be
    /// signed.
    pub async fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, TransportError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| TransportError::Unauthorized {
                message: format!("no AWS credentials: {e}"),
            })?;

        let identity = credentials.into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| unsignable(&e))?
            .into();
        let request = SignableRequest::new(
            method,
            url,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| unsignable(&e))?;
        let (instructions, _signature) = sign(request, &params)
            .map_err(|e| unsignable(&e))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

fn unsignable(err: &dyn std::error::Error) -> TransportError {
    TransportError::Rejected {
        status: 0,
        message: format!("cannot sign request: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use aws_credential_types::Credentials;

    use super::*;

    fn signer(session_token: Option<&str>) -> RequestSigner {
        let credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            session_token.map(ToString::to_string),
            None,
            "test",
        );
        RequestSigner::new(
            SharedCredentialsProvider::new(credentials),
            "us-east-2",
            "glue",
        )
    }

    #[tokio::test]
    async fn signs_with_scope_and_date() {
        let headers = signer(None)
            .sign(
                "GET",
                "https://glue.us-east-2.amazonaws.com/iceberg/v1/config?warehouse=a",
                &[("accept", "application/json")],
                b"",
            )
            .await
            .unwrap();

        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };
        let auth = get("authorization").expect("authorization header");
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("/us-east-2/glue/aws4_request"));
        assert!(auth.contains("SignedHeaders="));
        assert!(get("x-amz-date").is_some());
        assert!(get("x-amz-security-token").is_none());
    }

    #[tokio::test]
    async fn session_token_is_sent() {
        let headers = signer(Some("session-token"))
            .sign("POST", "https://glue.us-east-2.amazonaws.com/v1/x", &[], b"{}")
            .await
            .unwrap();
        assert!(headers
            .iter()
            .any(|(n, v)| n.eq_ignore_ascii_case("x-amz-security-token") && v == "session-token"));
    }
}
