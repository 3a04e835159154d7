//! Catalog transport with operation tracing.
//!
//! Wraps a [`MemoryCatalog`] and records every call for test assertions.
//! Conflicts are injected as real concurrent commits, so a retrying writer
//! observes the table moving exactly as it would against a live catalog.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use floe_catalog::encoder::EncodedBatch;
use floe_catalog::memory::{MemoryCatalog, PendingSnapshot};
use floe_catalog::schema::SchemaSpec;
use floe_catalog::transport::{
    CatalogConnector, CatalogTransport, CommitOutcome, CreateOutcome, RemoteTable, TableVersion,
    TransportError,
};
use floe_core::{NamespaceIdent, TableIdent};

/// Record of a catalog call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOp {
    /// Warehouse handshake.
    Connect {
        /// Warehouse requested.
        warehouse: String,
    },
    /// Namespace create.
    CreateNamespace {
        /// Namespace requested.
        namespace: NamespaceIdent,
    },
    /// Table create.
    CreateTable {
        /// Table requested.
        table: TableIdent,
    },
    /// Table load.
    LoadTable {
        /// Table requested.
        table: TableIdent,
    },
    /// Commit attempt.
    CommitAppend {
        /// Table committed to.
        table: TableIdent,
        /// Version the commit expected.
        expected: TableVersion,
        /// Records in the batch.
        records: u64,
    },
}

/// Call site for an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// [`CatalogConnector::connect`].
    Connect,
    /// [`CatalogTransport::create_namespace`].
    CreateNamespace,
    /// [`CatalogTransport::create_table`].
    CreateTable,
    /// [`CatalogTransport::load_table`].
    LoadTable,
    /// [`CatalogTransport::commit_append`].
    Commit,
}

/// Failure returned at a [`FailPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// [`TransportError::Unavailable`].
    Unavailable,
    /// [`TransportError::Unauthorized`].
    Unauthorized,
    /// [`TransportError::NotFound`].
    NotFound,
    /// [`TransportError::CommitStateUnknown`].
    CommitStateUnknown,
}

impl InjectedFailure {
    fn to_error(self) -> TransportError {
        let message = "injected failure".to_string();
        match self {
            Self::Unavailable => TransportError::unavailable(message),
            Self::Unauthorized => TransportError::Unauthorized { message },
            Self::NotFound => TransportError::NotFound { message },
            Self::CommitStateUnknown => TransportError::CommitStateUnknown { message },
        }
    }
}

/// In-memory catalog transport with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingTransport {
    catalog: MemoryCatalog,
    operations: Arc<Mutex<Vec<CatalogOp>>>,
    failures: Arc<Mutex<Vec<(FailPoint, InjectedFailure)>>>,
    pending_conflicts: Arc<Mutex<u32>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl TracingTransport {
    /// Creates a transport over a fresh catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes the simulated latency for subsequent calls.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().expect("lock") = latency;
    }

    /// Returns the underlying catalog.
    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<CatalogOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Returns the number of commit attempts recorded.
    pub fn commit_attempts(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, CatalogOp::CommitAppend { .. }))
            .count()
    }

    /// Returns the number of recorded operations other than the handshake.
    pub fn catalog_calls(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| !matches!(op, CatalogOp::Connect { .. }))
            .count()
    }

    /// Makes the next `count` commits lose a race: a concurrent writer
    /// appends one record just before each of them.
    pub fn inject_conflicts(&self, count: u32) {
        *self.pending_conflicts.lock().expect("lock") = count;
    }

    /// Fails every call at `point` until cleared.
    pub fn inject_failure(&self, point: FailPoint, failure: InjectedFailure) {
        self.failures.lock().expect("lock").push((point, failure));
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    fn record(&self, op: CatalogOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, point: FailPoint) -> Result<(), TransportError> {
        let failures = self.failures.lock().expect("lock");
        match failures.iter().find(|(p, _)| *p == point) {
            Some((_, failure)) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    async fn maybe_delay(&self) {
        let latency = *self.latency.lock().expect("lock");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_conflict(&self) -> bool {
        let mut pending = self.pending_conflicts.lock().expect("lock");
        if *pending == 0 {
            return false;
        }
        *pending -= 1;
        true
    }
}

#[async_trait]
impl CatalogTransport for TracingTransport {
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> Result<CreateOutcome, TransportError> {
        self.maybe_delay().await;
        self.record(CatalogOp::CreateNamespace {
            namespace: namespace.clone(),
        });
        self.check_failure(FailPoint::CreateNamespace)?;
        self.catalog.create_namespace(namespace).await
    }

    async fn create_table(
        &self,
        table: &TableIdent,
        schema: &SchemaSpec,
    ) -> Result<CreateOutcome, TransportError> {
        self.maybe_delay().await;
        self.record(CatalogOp::CreateTable {
            table: table.clone(),
        });
        self.check_failure(FailPoint::CreateTable)?;
        self.catalog.create_table(table, schema).await
    }

    async fn load_table(&self, table: &TableIdent) -> Result<RemoteTable, TransportError> {
        self.maybe_delay().await;
        self.record(CatalogOp::LoadTable {
            table: table.clone(),
        });
        self.check_failure(FailPoint::LoadTable)?;
        self.catalog.load_table(table).await
    }

    async fn commit_append(
        &self,
        table: &RemoteTable,
        expected: TableVersion,
        batch: &EncodedBatch,
    ) -> Result<CommitOutcome, TransportError> {
        self.maybe_delay().await;
        self.record(CatalogOp::CommitAppend {
            table: table.ident.clone(),
            expected,
            records: batch.record_count(),
        });
        self.check_failure(FailPoint::Commit)?;

        if self.take_conflict() {
            let current = self.catalog.load_table(&table.ident).await?.version;
            let location = format!(
                "{}/data/concurrent-{}.parquet",
                table.location,
                uuid::Uuid::new_v4()
            );
            self.catalog
                .commit_snapshot(&table.ident, current, PendingSnapshot::new(1, location))?;
        }
        self.catalog.commit_append(table, expected, batch).await
    }
}

#[async_trait]
impl CatalogConnector for TracingTransport {
    async fn connect(&self, warehouse: &str) -> Result<Arc<dyn CatalogTransport>, TransportError> {
        self.maybe_delay().await;
        self.record(CatalogOp::Connect {
            warehouse: warehouse.to_string(),
        });
        self.check_failure(FailPoint::Connect)?;
        Ok(Arc::new(self.clone()))
    }
}
