//! AWS plumbing: request signing, STS identity and S3 staging.
//!
//! Credentials come from the AWS SDK default provider chain: environment
//! variables, shared profiles, SSO, web identity, and container or instance
//! metadata.

mod s3;
mod signer;
mod sts;

pub use aws_config::SdkConfig;
pub use aws_credential_types::provider::SharedCredentialsProvider;
pub use s3::S3Backend;
pub use signer::RequestSigner;
pub use sts::StsIdentityProvider;

use aws_config::{BehaviorVersion, Region};

/// Loads the SDK configuration for `region` from the default chain.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}
