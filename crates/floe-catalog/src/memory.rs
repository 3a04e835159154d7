//! In-memory catalog for tests and local runs.
//!
//! [`MemoryCatalog`] implements both [`CatalogConnector`] and
//! [`CatalogTransport`] with the same contract as a remote catalog: creates
//! report [`CreateOutcome::AlreadyExists`] instead of failing, and a commit is
//! accepted only if the table is still at the expected version. Clones share
//! state, so several sessions can contend for the same table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use floe_core::{NamespaceIdent, TableIdent};
use uuid::Uuid;

use crate::encoder::EncodedBatch;
use crate::schema::SchemaSpec;
use crate::transport::{
    CatalogConnector, CatalogTransport, CommitOutcome, CreateOutcome, RemoteTable, TableVersion,
    TransportError,
};

/// A committed snapshot held by [`MemoryCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Snapshot id.
    pub snapshot_id: i64,
    /// Parent snapshot id.
    pub parent_snapshot_id: Option<i64>,
    /// Sequence number.
    pub sequence_number: i64,
    /// Records added by this snapshot.
    pub added_records: u64,
    /// Total records after this snapshot.
    pub total_records: u64,
    /// Data file location.
    pub data_location: String,
    /// Data file contents, when the committer supplied them.
    pub data: Option<Bytes>,
    /// Manifest list location, when the committer wrote one.
    pub manifest_list: Option<String>,
}

/// An append to commit against a [`MemoryCatalog`] table.
#[derive(Debug, Clone, Default)]
pub struct PendingSnapshot {
    /// Snapshot id chosen by the committer; the catalog assigns one if unset.
    pub snapshot_id: Option<i64>,
    /// Records added.
    pub added_records: u64,
    /// Data file location.
    pub data_location: String,
    /// Data file contents.
    pub data: Option<Bytes>,
    /// Manifest list location.
    pub manifest_list: Option<String>,
}

impl PendingSnapshot {
    /// An append of `added_records` rows stored at `data_location`.
    #[must_use]
    pub fn new(added_records: u64, data_location: impl Into<String>) -> Self {
        Self {
            added_records,
            data_location: data_location.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    uuid: Uuid,
    location: String,
    schema: SchemaSpec,
    snapshots: Vec<MemorySnapshot>,
}

impl MemoryTable {
    fn current(&self) -> Option<&MemorySnapshot> {
        self.snapshots.last()
    }

    fn version(&self) -> TableVersion {
        TableVersion::new(self.current().map(|s| s.snapshot_id))
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    namespaces: BTreeSet<NamespaceIdent>,
    tables: BTreeMap<TableIdent, MemoryTable>,
    next_snapshot_id: i64,
}

/// Shared in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    warehouse: Option<String>,
}

fn poisoned() -> TransportError {
    TransportError::unavailable("memory catalog lock poisoned")
}

impl MemoryCatalog {
    /// Creates an empty catalog that accepts any warehouse.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the handshake to a single warehouse; any other is rejected
    /// as unauthorized.
    #[must_use]
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Seeds a table (and its namespace), replacing any existing one.
    ///
    /// Simulates a table created out of band, possibly with a different
    /// schema than the one a caller will later expect.
    pub fn insert_table(&self, table: &TableIdent, schema: SchemaSpec) {
        if let Ok(mut state) = self.state.write() {
            state.namespaces.insert(table.namespace().clone());
            state.tables.insert(table.clone(), new_table(table, &schema));
        }
    }

    /// Drops a table if present.
    pub fn drop_table(&self, table: &TableIdent) {
        if let Ok(mut state) = self.state.write() {
            state.tables.remove(table);
        }
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.state.read().map_or(0, |s| s.tables.len())
    }

    /// Returns true if the namespace exists.
    #[must_use]
    pub fn has_namespace(&self, namespace: &NamespaceIdent) -> bool {
        self.state
            .read()
            .is_ok_and(|s| s.namespaces.contains(namespace))
    }

    /// Returns the committed snapshots of a table, oldest first.
    #[must_use]
    pub fn snapshots(&self, table: &TableIdent) -> Vec<MemorySnapshot> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.tables.get(table).map(|t| t.snapshots.clone()))
            .unwrap_or_default()
    }

    /// Commits `pending` if the table is still at `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if the table does not exist and
    /// [`TransportError::Rejected`] if the snapshot id is already taken.
    pub fn commit_snapshot(
        &self,
        table: &TableIdent,
        expected: TableVersion,
        pending: PendingSnapshot,
    ) -> Result<CommitOutcome, TransportError> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        let CatalogState {
            tables,
            next_snapshot_id,
            ..
        } = &mut *guard;

        let entry = tables.get_mut(table).ok_or_else(|| not_found(table))?;
        let current = entry.version();
        if current != expected {
            return Ok(CommitOutcome::VersionConflict {
                message: format!("expected {expected}, table is at {current}"),
            });
        }
        let snapshot_id = match pending.snapshot_id {
            Some(id) if entry.snapshots.iter().any(|s| s.snapshot_id == id) => {
                return Err(TransportError::Rejected {
                    status: 400,
                    message: format!("snapshot {id} already exists in {table}"),
                });
            }
            Some(id) => id,
            None => {
                *next_snapshot_id += 1;
                *next_snapshot_id
            }
        };

        let parent = entry.current().cloned();
        let total_records = parent.as_ref().map_or(0, |p| p.total_records) + pending.added_records;
        let sequence_number = parent.as_ref().map_or(0, |p| p.sequence_number) + 1;
        entry.snapshots.push(MemorySnapshot {
            snapshot_id,
            parent_snapshot_id: parent.map(|p| p.snapshot_id),
            sequence_number,
            added_records: pending.added_records,
            total_records,
            data_location: pending.data_location,
            data: pending.data,
            manifest_list: pending.manifest_list.clone(),
        });

        Ok(CommitOutcome::Accepted {
            version: TableVersion::snapshot(snapshot_id),
            total_records,
            sequence_number,
            manifest_list: pending.manifest_list,
        })
    }

    fn describe(table: &TableIdent, entry: &MemoryTable) -> RemoteTable {
        RemoteTable {
            ident: table.clone(),
            table_uuid: entry.uuid,
            location: entry.location.clone(),
            metadata_location: None,
            schema: entry.schema.clone(),
            schema_id: 0,
            version: entry.version(),
            manifest_list: entry.current().and_then(|s| s.manifest_list.clone()),
            last_sequence_number: entry.current().map_or(0, |s| s.sequence_number),
            total_records: entry.current().map_or(0, |s| s.total_records),
        }
    }
}

fn new_table(table: &TableIdent, schema: &SchemaSpec) -> MemoryTable {
    let uuid = Uuid::new_v4();
    MemoryTable {
        uuid,
        location: format!(
            "memory://warehouse/{}/{}-{}",
            table.namespace(),
            table.name(),
            uuid.simple()
        ),
        schema: schema.with_assigned_ids(),
        snapshots: Vec::new(),
    }
}

fn not_found(table: &TableIdent) -> TransportError {
    TransportError::NotFound {
        message: format!("table {table} does not exist"),
    }
}

#[async_trait]
impl CatalogTransport for MemoryCatalog {
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> Result<CreateOutcome, TransportError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(if state.namespaces.insert(namespace.clone()) {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        })
    }

    async fn create_table(
        &self,
        table: &TableIdent,
        schema: &SchemaSpec,
    ) -> Result<CreateOutcome, TransportError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.namespaces.contains(table.namespace()) {
            return Err(TransportError::NotFound {
                message: format!("namespace {} does not exist", table.namespace()),
            });
        }
        if state.tables.contains_key(table) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.tables.insert(table.clone(), new_table(table, schema));
        Ok(CreateOutcome::Created)
    }

    async fn load_table(&self, table: &TableIdent) -> Result<RemoteTable, TransportError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .tables
            .get(table)
            .map(|entry| Self::describe(table, entry))
            .ok_or_else(|| not_found(table))
    }

    async fn commit_append(
        &self,
        table: &RemoteTable,
        expected: TableVersion,
        batch: &EncodedBatch,
    ) -> Result<CommitOutcome, TransportError> {
        {
            let state = self.state.read().map_err(|_| poisoned())?;
            let entry = state.tables.get(&table.ident).ok_or_else(|| not_found(&table.ident))?;
            // A failed table-uuid requirement is a commit conflict on the wire.
            if entry.uuid != table.table_uuid {
                return Ok(CommitOutcome::VersionConflict {
                    message: format!("table {} was replaced", table.ident),
                });
            }
        }
        let location = format!(
            "{}/data/{}",
            table.location.trim_end_matches('/'),
            batch.file_name()
        );
        self.commit_snapshot(
            &table.ident,
            expected,
            PendingSnapshot {
                data: Some(batch.data().clone()),
                ..PendingSnapshot::new(batch.record_count(), location)
            },
        )
    }
}

#[async_trait]
impl CatalogConnector for MemoryCatalog {
    async fn connect(&self, warehouse: &str) -> Result<Arc<dyn CatalogTransport>, TransportError> {
        if let Some(allowed) = &self.warehouse {
            if allowed != warehouse {
                return Err(TransportError::Unauthorized {
                    message: format!("warehouse {warehouse} is not accessible"),
                });
            }
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, LogicalType};

    fn table() -> TableIdent {
        TableIdent::parse("db.events").unwrap()
    }

    fn schema() -> SchemaSpec {
        SchemaSpec::new(vec![FieldSpec::optional("id", LogicalType::Int64)]).unwrap()
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let ns = table().namespace().clone();
        assert_eq!(catalog.create_namespace(&ns).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            catalog.create_namespace(&ns).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(
            catalog.create_table(&table(), &schema()).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            catalog.create_table(&table(), &schema()).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(catalog.table_count(), 1);
    }

    #[tokio::test]
    async fn create_table_requires_namespace() {
        let catalog = MemoryCatalog::new();
        let err = catalog.create_table(&table(), &schema()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound { .. }));
    }

    #[tokio::test]
    async fn commit_checks_expected_version() {
        let catalog = MemoryCatalog::new();
        catalog.insert_table(&table(), schema());

        let first = catalog
            .commit_snapshot(&table(), TableVersion::EMPTY, PendingSnapshot::new(2, "a"))
            .unwrap();
        let CommitOutcome::Accepted { version, total_records, sequence_number, .. } = first else {
            panic!("expected accepted commit");
        };
        assert_eq!(total_records, 2);
        assert_eq!(sequence_number, 1);

        let stale = catalog
            .commit_snapshot(&table(), TableVersion::EMPTY, PendingSnapshot::new(2, "b"))
            .unwrap();
        assert!(matches!(stale, CommitOutcome::VersionConflict { .. }));

        let second = catalog
            .commit_snapshot(&table(), version, PendingSnapshot::new(3, "c"))
            .unwrap();
        assert!(matches!(second, CommitOutcome::Accepted { total_records: 5, .. }));

        let snapshots = catalog.snapshots(&table());
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].parent_snapshot_id, Some(snapshots[0].snapshot_id));

        let remote = catalog.load_table(&table()).await.unwrap();
        assert_eq!(remote.total_records, 5);
        assert_eq!(remote.version, TableVersion::snapshot(snapshots[1].snapshot_id));
    }

    #[tokio::test]
    async fn committer_chosen_snapshot_ids_are_kept() {
        let catalog = MemoryCatalog::new();
        catalog.insert_table(&table(), schema());

        let pending = PendingSnapshot {
            snapshot_id: Some(4242),
            manifest_list: Some("memory://t/metadata/snap-4242.avro".into()),
            ..PendingSnapshot::new(1, "a")
        };
        let outcome = catalog
            .commit_snapshot(&table(), TableVersion::EMPTY, pending.clone())
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Accepted { version, manifest_list: Some(_), .. }
                if version == TableVersion::snapshot(4242)
        ));
        let remote = catalog.load_table(&table()).await.unwrap();
        assert_eq!(remote.manifest_list, pending.manifest_list);

        let reused = catalog
            .commit_snapshot(&table(), remote.version, pending)
            .unwrap_err();
        assert!(matches!(reused, TransportError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn connect_checks_warehouse() {
        let catalog = MemoryCatalog::new().with_warehouse("123:s3tablescatalog/bucket");
        assert!(catalog.connect("123:s3tablescatalog/bucket").await.is_ok());
        let err = catalog.connect("999:s3tablescatalog/bucket").await.unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized { .. }));
    }
}
