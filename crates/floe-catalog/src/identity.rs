//! Account identity resolution.

use async_trait::async_trait;
use floe_core::AccountId;

use crate::transport::TransportError;

/// Resolves the account that owns the warehouse.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the caller's account id.
    async fn account_identity(&self) -> Result<AccountId, TransportError>;
}

/// An identity known up front, for local catalogs and tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity(AccountId);

impl StaticIdentity {
    /// Wraps a known account id.
    #[must_use]
    pub const fn new(account: AccountId) -> Self {
        Self(account)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn account_identity(&self) -> Result<AccountId, TransportError> {
        Ok(self.0.clone())
    }
}
