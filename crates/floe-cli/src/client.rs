//! Catalog connection setup for CLI commands.

use std::sync::Arc;

use floe_catalog::aws::{self, S3Backend, SharedCredentialsProvider, StsIdentityProvider};
use floe_catalog::config::CatalogConfig;
use floe_catalog::error::{CatalogError, Result};
use floe_catalog::identity::{IdentityProvider, StaticIdentity};
use floe_catalog::rest::RestConnector;
use floe_catalog::session::CatalogSession;
use floe_core::{AccountId, MemoryBackend, StorageBackend};

use crate::Config;

/// What a command needs from object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staging {
    /// The command writes data files.
    Required,
    /// The command only talks to the catalog.
    Unused,
}

/// Opens a catalog session from CLI settings.
///
/// Credentials come from the AWS default provider chain. The account comes
/// from `--account-id` when given and from STS otherwise.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidConfig`] for unusable settings and
/// [`CatalogError::Auth`] when identity resolution or the handshake fails.
pub async fn connect(config: &Config, staging: Staging) -> Result<CatalogSession> {
    let catalog = config.catalog_config();
    catalog.validate()?;

    let sdk_config = aws::load_sdk_config(&catalog.region).await;
    let credentials = sdk_config.credentials_provider();
    tracing::debug!(
        region = %catalog.region,
        credentials = credentials.is_some(),
        "loaded AWS configuration"
    );

    let identity: Box<dyn IdentityProvider> = match &config.account_id {
        Some(account) => Box::new(StaticIdentity::new(
            AccountId::new(account).map_err(|e| CatalogError::config(e.to_string()))?,
        )),
        None => Box::new(StsIdentityProvider::new(&sdk_config)),
    };

    let storage: Arc<dyn StorageBackend> = match staging {
        Staging::Required => Arc::new(S3Backend::new(&catalog.region, credentials.clone())),
        Staging::Unused => Arc::new(MemoryBackend::new()),
    };

    connect_with(&catalog, identity.as_ref(), credentials, storage).await
}

/// Opens a session with explicit identity, credentials and storage.
///
/// # Errors
///
/// See [`connect`].
pub async fn connect_with(
    catalog: &CatalogConfig,
    identity: &dyn IdentityProvider,
    credentials: Option<SharedCredentialsProvider>,
    storage: Arc<dyn StorageBackend>,
) -> Result<CatalogSession> {
    let connector = RestConnector::new(catalog, credentials, storage)?;
    CatalogSession::open(identity, &connector, catalog.clone()).await
}
