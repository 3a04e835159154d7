//! Idempotent table provisioning.
//!
//! `ensure_table` is safe to call on every run: it creates the table if it is
//! absent, adopts it if it exists, and refuses to hand out a handle when the
//! remote schema is incompatible with the expected one. Existing tables are
//! never modified.

use floe_core::{NamespaceIdent, TableIdent};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::schema::{SchemaSpec, SchemaWarning};
use crate::session::CatalogSession;
use crate::transport::{CreateOutcome, RemoteTable, TableVersion, TransportError};

/// Whether `ensure_table` created the table or found it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// This call created the table.
    Created,
    /// The table already existed and was adopted.
    Adopted,
}

/// Stable identity of a table: its identifier plus catalog UUID.
///
/// Two handles to the same physical table compare equal; a table that was
/// dropped and recreated under the same name does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    /// Table identifier.
    pub ident: TableIdent,
    /// Catalog-assigned UUID.
    pub table_uuid: Uuid,
}

/// A provisioned table whose schema is known to be compatible.
#[derive(Debug, Clone)]
pub struct TableHandle {
    remote: RemoteTable,
    expected: SchemaSpec,
    outcome: ProvisionOutcome,
    warnings: Vec<SchemaWarning>,
}

impl TableHandle {
    /// Returns the table identifier.
    #[must_use]
    pub fn ident(&self) -> &TableIdent {
        &self.remote.ident
    }

    /// Returns the stable table identity.
    #[must_use]
    pub fn identity(&self) -> TableIdentity {
        TableIdentity {
            ident: self.remote.ident.clone(),
            table_uuid: self.remote.table_uuid,
        }
    }

    /// Returns the remote schema, which batches are validated against.
    #[must_use]
    pub fn schema(&self) -> &SchemaSpec {
        &self.remote.schema
    }

    /// Returns the schema the caller asked for.
    #[must_use]
    pub fn expected_schema(&self) -> &SchemaSpec {
        &self.expected
    }

    /// Returns the last version this handle observed.
    #[must_use]
    pub fn version(&self) -> TableVersion {
        self.remote.version
    }

    /// Returns the total record count at the observed version.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.remote.total_records
    }

    /// Returns the remote description backing this handle.
    #[must_use]
    pub fn remote(&self) -> &RemoteTable {
        &self.remote
    }

    /// Returns whether the table was created or adopted.
    #[must_use]
    pub fn outcome(&self) -> ProvisionOutcome {
        self.outcome
    }

    /// Returns true if this handle's `ensure_table` call created the table.
    #[must_use]
    pub fn was_created(&self) -> bool {
        self.outcome == ProvisionOutcome::Created
    }

    /// Returns tolerated schema differences found during provisioning.
    #[must_use]
    pub fn warnings(&self) -> &[SchemaWarning] {
        &self.warnings
    }

    /// Replaces the remote description after a reload, re-checking that the
    /// table is the same physical table and still compatible.
    pub(crate) fn refresh(&mut self, remote: RemoteTable) -> Result<()> {
        if remote.table_uuid != self.remote.table_uuid {
            return Err(CatalogError::Load {
                table: self.remote.ident.to_string(),
                message: format!(
                    "table was replaced (uuid {} is now {})",
                    self.remote.table_uuid, remote.table_uuid
                ),
            });
        }
        let comparison = check_compatible(&remote.ident, &self.expected, &remote.schema)?;
        self.warnings = comparison;
        self.remote = remote;
        Ok(())
    }

    /// Records a successful commit.
    pub(crate) fn advance(
        &mut self,
        version: TableVersion,
        total_records: u64,
        sequence: i64,
        manifest_list: Option<String>,
    ) {
        self.remote.version = version;
        self.remote.total_records = total_records;
        self.remote.last_sequence_number = sequence;
        self.remote.manifest_list = manifest_list;
    }
}

/// Ensures tables exist with a compatible schema.
#[derive(Debug, Clone)]
pub struct TableProvisioner {
    session: CatalogSession,
}

impl TableProvisioner {
    /// Creates a provisioner bound to a session.
    #[must_use]
    pub const fn new(session: CatalogSession) -> Self {
        Self { session }
    }

    /// Ensures `table` exists with a schema compatible with `schema`.
    ///
    /// Creates the namespace first when configured to, then the table, then
    /// loads the table and compares schemas. A table created concurrently by
    /// another writer is adopted like any existing table.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Transport`] if a round trip fails or times out
    /// - [`CatalogError::Load`] if the table cannot be loaded after creation
    /// - [`CatalogError::SchemaMismatch`] if the remote schema is incompatible
    #[tracing::instrument(skip(self, schema), fields(table = %table, warehouse = %self.session.warehouse()))]
    pub async fn ensure_table(&self, table: &TableIdent, schema: &SchemaSpec) -> Result<TableHandle> {
        if self.session.config().create_namespace {
            self.ensure_namespace(table.namespace()).await?;
        }

        let created = self
            .session
            .round_trip("create_table", |t| async move { t.create_table(table, schema).await })
            .await?
            .map_err(|e| CatalogError::transport("create_table", e))?;
        match created {
            CreateOutcome::Created => tracing::info!("created table"),
            CreateOutcome::AlreadyExists => tracing::info!("table already exists, adopting"),
        }

        let remote = self.load(table).await?;
        tracing::info!(
            schema = %remote.schema,
            version = %remote.version,
            table_uuid = %remote.table_uuid,
            "loaded table"
        );

        let warnings = check_compatible(table, schema, &remote.schema)?;
        for warning in &warnings {
            tracing::warn!(%warning, "schema drift tolerated");
        }

        Ok(TableHandle {
            remote,
            expected: schema.clone(),
            outcome: match created {
                CreateOutcome::Created => ProvisionOutcome::Created,
                CreateOutcome::AlreadyExists => ProvisionOutcome::Adopted,
            },
            warnings,
        })
    }

    /// Loads the current description of a table without any schema check.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Load`] if the table does not exist and
    /// [`CatalogError::Transport`] for other round-trip failures.
    pub async fn load(&self, table: &TableIdent) -> Result<RemoteTable> {
        load_table(&self.session, table).await
    }

    async fn ensure_namespace(&self, namespace: &NamespaceIdent) -> Result<()> {
        let outcome = self
            .session
            .round_trip("create_namespace", |t| async move {
                t.create_namespace(namespace).await
            })
            .await?
            .map_err(|e| CatalogError::transport("create_namespace", e))?;
        tracing::debug!(namespace = %namespace, ?outcome, "namespace ensured");
        Ok(())
    }
}

/// Loads a table, mapping absence to [`CatalogError::Load`].
pub(crate) async fn load_table(session: &CatalogSession, table: &TableIdent) -> Result<RemoteTable> {
    session
        .round_trip("load_table", |t| async move { t.load_table(table).await })
        .await?
        .map_err(|e| match e {
            TransportError::NotFound { message } => CatalogError::Load {
                table: table.to_string(),
                message,
            },
            other => CatalogError::transport("load_table", other),
        })
}

fn check_compatible(
    table: &TableIdent,
    expected: &SchemaSpec,
    remote: &SchemaSpec,
) -> Result<Vec<SchemaWarning>> {
    let comparison = expected.compare(remote);
    if !comparison.is_compatible() {
        return Err(CatalogError::SchemaMismatch {
            table: table.to_string(),
            mismatches: comparison.mismatches,
        });
    }
    Ok(comparison.warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, RetryPolicy, SigningConfig};
    use crate::identity::StaticIdentity;
    use crate::memory::MemoryCatalog;
    use crate::schema::{FieldSpec, LogicalType};
    use floe_core::AccountId;

    fn schema() -> SchemaSpec {
        SchemaSpec::new(vec![
            FieldSpec::optional("customer_id", LogicalType::Int32),
            FieldSpec::optional("name", LogicalType::String),
        ])
        .unwrap()
    }

    async fn session(catalog: &MemoryCatalog) -> CatalogSession {
        let config = CatalogConfig::new("us-east-2", "bucket")
            .with_signing(SigningConfig::disabled())
            .with_retry(RetryPolicy::immediate(3));
        let identity = StaticIdentity::new(AccountId::new("123456789012").unwrap());
        CatalogSession::open(&identity, catalog, config).await.unwrap()
    }

    #[tokio::test]
    async fn creates_then_adopts() {
        let catalog = MemoryCatalog::new();
        let provisioner = TableProvisioner::new(session(&catalog).await);
        let table = TableIdent::parse("db.customers").unwrap();

        let first = provisioner.ensure_table(&table, &schema()).await.unwrap();
        assert!(first.was_created());
        assert!(first.version().is_empty());

        let second = provisioner.ensure_table(&table, &schema()).await.unwrap();
        assert_eq!(second.outcome(), ProvisionOutcome::Adopted);
        assert_eq!(first.identity(), second.identity());
        assert_eq!(catalog.table_count(), 1);
    }

    #[tokio::test]
    async fn refresh_rejects_replaced_table() {
        let catalog = MemoryCatalog::new();
        let session = session(&catalog).await;
        let provisioner = TableProvisioner::new(session);
        let table = TableIdent::parse("db.customers").unwrap();
        let mut handle = provisioner.ensure_table(&table, &schema()).await.unwrap();

        catalog.drop_table(&table);
        catalog.insert_table(&table, schema());
        let remote = provisioner.load(&table).await.unwrap();

        let err = handle.refresh(remote).unwrap_err();
        assert!(matches!(err, CatalogError::Load { .. }));
    }
}
