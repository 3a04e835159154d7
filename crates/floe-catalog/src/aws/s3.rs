//! S3 object storage on `object_store`.
//!
//! Paths are `s3://bucket/key` URIs. One [`AmazonS3`] client is built per
//! bucket on first use. Conditional writes map onto S3 conditional puts:
//! `If-None-Match: *` for create-only writes and `If-Match` for versioned
//! ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use bytes::Bytes;
use floe_core::{Error, ObjectMeta, Result, StorageBackend, WritePrecondition, WriteResult};
use object_store::aws::{AmazonS3, AmazonS3Builder, AwsCredential, S3ConditionalPut};
use object_store::path::Path;
use object_store::{CredentialProvider, ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};

/// [`StorageBackend`] for S3 buckets.
#[derive(Debug)]
pub struct S3Backend {
    region: String,
    credentials: Option<SharedCredentialsProvider>,
    endpoint: Option<String>,
    stores: Mutex<HashMap<String, Arc<AmazonS3>>>,
}

impl S3Backend {
    /// Creates a backend for buckets in `region`.
    ///
    /// Without `credentials`, `object_store` falls back to its own
    /// environment and instance-metadata lookup.
    #[must_use]
    pub fn new(region: impl Into<String>, credentials: Option<SharedCredentialsProvider>) -> Self {
        Self {
            region: region.into(),
            credentials,
            endpoint: None,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Uses path-style requests against a custom endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn store(&self, bucket: &str) -> Result<Arc<AmazonS3>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| Error::storage("S3 client cache lock poisoned"))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let mut builder = AmazonS3Builder::new()
            .with_region(&self.region)
            .with_bucket_name(bucket)
            .with_conditional_put(S3ConditionalPut::ETagMatch);
        if let Some(credentials) = &self.credentials {
            builder = builder.with_credentials(Arc::new(SdkCredentials(credentials.clone())));
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http:"))
                .with_virtual_hosted_style_request(false);
        }
        let store = Arc::new(builder.build().map_err(|e| {
            Error::storage_with_source(format!("cannot build S3 client for bucket {bucket}"), e)
        })?);
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn locate(&self, uri: &str) -> Result<(Arc<AmazonS3>, Path)> {
        let (bucket, key) = parse_s3_uri(uri)?;
        Ok((self.store(bucket)?, Path::from(key)))
    }
}

/// Feeds credentials from the AWS SDK provider chain to `object_store`.
#[derive(Debug)]
struct SdkCredentials(SharedCredentialsProvider);

#[async_trait]
impl CredentialProvider for SdkCredentials {
    type Credential = AwsCredential;

    async fn get_credential(&self) -> object_store::Result<Arc<AwsCredential>> {
        let credentials = self
            .0
            .provide_credentials()
            .await
            .map_err(|e| object_store::Error::Generic {
                store: "S3",
                source: Box::new(e),
            })?;
        Ok(Arc::new(AwsCredential {
            key_id: credentials.access_key_id().to_string(),
            secret_key: credentials.secret_access_key().to_string(),
            token: credentials.session_token().map(ToString::to_string),
        }))
    }
}

fn parse_s3_uri(path: &str) -> Result<(&str, &str)> {
    let rest = path
        .strip_prefix("s3://")
        .or_else(|| path.strip_prefix("s3a://"))
        .ok_or_else(|| Error::InvalidInput(format!("'{path}' is not an s3:// URI")))?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(Error::InvalidInput(format!(
            "'{path}' must have the form s3://bucket/key"
        ))),
    }
}

fn failed(op: &str, path: &str, err: object_store::Error) -> Error {
    Error::storage_with_source(format!("S3 {op} {path} failed"), err)
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let (store, key) = self.locate(path)?;
        let result = match store.get(&key).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(Error::NotFound(format!("object not found: {path}")));
            }
            Err(e) => return Err(failed("GET", path, e)),
        };
        result.bytes().await.map_err(|e| failed("GET", path, e))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let (store, key) = self.locate(path)?;
        let mode = match precondition {
            WritePrecondition::None => PutMode::Overwrite,
            WritePrecondition::DoesNotExist => PutMode::Create,
            WritePrecondition::MatchesVersion(version) => PutMode::Update(UpdateVersion {
                e_tag: Some(version),
                version: None,
            }),
        };

        match store
            .put_opts(&key, PutPayload::from(data), PutOptions::from(mode))
            .await
        {
            Ok(result) => Ok(WriteResult::Success {
                version: result.e_tag.unwrap_or_default(),
            }),
            Err(object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. }) => {
                Ok(WriteResult::PreconditionFailed {
                    current_version: None,
                })
            }
            Err(e) => Err(failed("PUT", path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (store, key) = self.locate(path)?;
        match store.delete(&key).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(failed("DELETE", path, e)),
        }
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let (store, key) = self.locate(path)?;
        match store.head(&key).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: path.to_string(),
                size: meta.size as u64,
                version: meta.e_tag.unwrap_or_default(),
                last_modified: Some(meta.last_modified),
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(failed("HEAD", path, e)),
        }
    }
}
