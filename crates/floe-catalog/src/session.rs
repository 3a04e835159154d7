//! Authenticated catalog sessions.
//!
//! A [`CatalogSession`] binds a resolved account identity, the derived
//! warehouse, and a transport that completed the handshake. It is cheap to
//! clone and safe to share across tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use floe_core::AccountId;

use crate::config::{CatalogConfig, SigningConfig};
use crate::error::{CatalogError, Result};
use crate::identity::IdentityProvider;
use crate::transport::{CatalogConnector, CatalogTransport, TransportError};

/// A live, authenticated connection to a warehouse.
#[derive(Debug, Clone)]
pub struct CatalogSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    account: AccountId,
    warehouse: String,
    endpoint: String,
    config: CatalogConfig,
    transport: Arc<dyn CatalogTransport>,
}

impl CatalogSession {
    /// Opens a session: resolves the account, derives the warehouse and
    /// performs the catalog handshake.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidConfig`] if the configuration is invalid
    /// and [`CatalogError::Auth`] if identity resolution or the handshake
    /// fails or times out.
    #[tracing::instrument(
        skip_all,
        fields(region = %config.region, catalog = %config.catalog_name, bucket = %config.table_bucket)
    )]
    pub async fn open(
        identity: &dyn IdentityProvider,
        connector: &dyn CatalogConnector,
        config: CatalogConfig,
    ) -> Result<Self> {
        config.validate()?;
        let limit = config.request_timeout;

        let account = tokio::time::timeout(limit, identity.account_identity())
            .await
            .map_err(|_| timed_out("identity resolution", limit))?
            .map_err(|e| CatalogError::auth("identity resolution failed", e))?;

        let warehouse = config.warehouse(&account);
        let transport = tokio::time::timeout(limit, connector.connect(&warehouse))
            .await
            .map_err(|_| timed_out("catalog handshake", limit))?
            .map_err(|e| CatalogError::auth(format!("handshake with {warehouse} failed"), e))?;

        let endpoint = config.endpoint();
        tracing::info!(
            account = %account,
            warehouse = %warehouse,
            endpoint = %endpoint,
            "catalog session opened"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                account,
                warehouse,
                endpoint,
                config,
                transport,
            }),
        })
    }

    /// Returns the resolved account.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.inner.account
    }

    /// Returns the warehouse identifier.
    #[must_use]
    pub fn warehouse(&self) -> &str {
        &self.inner.warehouse
    }

    /// Returns the catalog endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Returns the catalog region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.inner.config.region
    }

    /// Returns the signing settings.
    #[must_use]
    pub fn signing(&self) -> &SigningConfig {
        &self.inner.config.signing
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    /// Runs one catalog round trip under the configured timeout.
    ///
    /// The outer result carries the timeout; the inner one is the transport's
    /// own result, left for the caller to map.
    pub(crate) async fn round_trip<T, F>(
        &self,
        operation: &'static str,
        call: impl FnOnce(Arc<dyn CatalogTransport>) -> F,
    ) -> Result<std::result::Result<T, TransportError>>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        let limit = self.inner.config.request_timeout;
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(limit, call(Arc::clone(&self.inner.transport)))
            .await
            .map_err(|_| {
                tracing::warn!(operation, timeout_ms = limit.as_millis(), "catalog call timed out");
                CatalogError::timeout(operation, limit)
            })?;
        tracing::debug!(
            operation,
            elapsed_ms = started.elapsed().as_millis(),
            ok = outcome.is_ok(),
            "catalog call finished"
        );
        Ok(outcome)
    }
}

fn timed_out(step: &str, limit: Duration) -> CatalogError {
    CatalogError::Auth {
        message: format!("{step} timed out after {}ms", limit.as_millis()),
        source: None,
    }
}
