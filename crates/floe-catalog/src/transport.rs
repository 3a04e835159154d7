//! The catalog transport seam.
//!
//! Provisioning and append logic is written against [`CatalogTransport`] so it
//! can run against the REST catalog, the in-memory catalog, or a test double
//! that injects failures. A [`CatalogConnector`] performs the warehouse
//! handshake and hands back a transport bound to that warehouse.
//!
//! Transport methods report expected races as tagged outcomes rather than
//! errors: a create that finds the table already there is
//! [`CreateOutcome::AlreadyExists`], and a commit against a stale version is
//! [`CommitOutcome::VersionConflict`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use floe_core::{NamespaceIdent, TableIdent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoder::EncodedBatch;
use crate::error::BoxError;
use crate::schema::SchemaSpec;

/// The committed version of a table: the snapshot id on its main branch.
///
/// An empty table has no snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableVersion(Option<i64>);

impl TableVersion {
    /// The version of a table with no snapshots.
    pub const EMPTY: Self = Self(None);

    /// Creates a version from an optional snapshot id.
    #[must_use]
    pub const fn new(snapshot_id: Option<i64>) -> Self {
        Self(snapshot_id)
    }

    /// Creates a version pointing at a snapshot.
    #[must_use]
    pub const fn snapshot(snapshot_id: i64) -> Self {
        Self(Some(snapshot_id))
    }

    /// Returns the snapshot id, if any.
    #[must_use]
    pub const fn snapshot_id(self) -> Option<i64> {
        self.0
    }

    /// Returns true for a table with no snapshots.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for TableVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "snapshot {id}"),
            None => f.write_str("empty"),
        }
    }
}

/// Outcome of a create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created by this call.
    Created,
    /// The object already existed; nothing changed.
    AlreadyExists,
}

/// A table as the catalog currently describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTable {
    /// Table identifier.
    pub ident: TableIdent,
    /// Catalog-assigned table UUID; changes if the table is dropped and
    /// recreated.
    pub table_uuid: Uuid,
    /// Base location for table data.
    pub location: String,
    /// Location of the current metadata file, if the catalog exposes it.
    pub metadata_location: Option<String>,
    /// Current schema.
    pub schema: SchemaSpec,
    /// Id of the current schema.
    pub schema_id: i32,
    /// Current committed version.
    pub version: TableVersion,
    /// Manifest list of the current snapshot.
    pub manifest_list: Option<String>,
    /// Highest sequence number assigned so far.
    pub last_sequence_number: i64,
    /// Total records across the current snapshot.
    pub total_records: u64,
}

/// Outcome of a commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The append became the table's new version.
    Accepted {
        /// The new committed version.
        version: TableVersion,
        /// Total records after the commit.
        total_records: u64,
        /// Sequence number of the new snapshot.
        sequence_number: i64,
        /// Manifest list of the new snapshot.
        manifest_list: Option<String>,
    },
    /// The table moved past the expected version; nothing was committed.
    VersionConflict {
        /// Catalog-provided description.
        message: String,
    },
}

/// Failures of a single catalog round trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The requested object does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Catalog-provided description.
        message: String,
    },

    /// Credentials were rejected or lack permission.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Catalog-provided description.
        message: String,
    },

    /// The catalog rejected the request as malformed or unsupported.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status, or 0 when not applicable.
        status: u16,
        /// Catalog-provided description.
        message: String,
    },

    /// The catalog could not be reached or is temporarily failing.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
        /// The underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// The catalog answered with a body floe could not interpret.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the problem.
        message: String,
    },

    /// A commit failed in a way that leaves its outcome unknown.
    #[error("commit state unknown: {message}")]
    CommitStateUnknown {
        /// Catalog-provided description.
        message: String,
    },
}

impl TransportError {
    /// Creates an unavailable error without a source.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an unavailable error with a source cause.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if repeating the call may succeed.
    ///
    /// An unknown commit state is not retryable: repeating it could apply the
    /// same batch twice.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Catalog operations used by provisioning and appends.
#[async_trait]
pub trait CatalogTransport: Send + Sync + fmt::Debug {
    /// Creates a namespace, reporting whether it already existed.
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> Result<CreateOutcome, TransportError>;

    /// Creates a table, reporting whether it already existed.
    ///
    /// An existing table is left untouched whatever its schema.
    async fn create_table(
        &self,
        table: &TableIdent,
        schema: &SchemaSpec,
    ) -> Result<CreateOutcome, TransportError>;

    /// Loads the current description of a table.
    async fn load_table(&self, table: &TableIdent) -> Result<RemoteTable, TransportError>;

    /// Commits an encoded batch as a new snapshot, conditional on the table
    /// still being at `expected`.
    async fn commit_append(
        &self,
        table: &RemoteTable,
        expected: TableVersion,
        batch: &EncodedBatch,
    ) -> Result<CommitOutcome, TransportError>;
}

/// Performs the warehouse handshake.
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    /// Connects to the given warehouse and returns a bound transport.
    async fn connect(&self, warehouse: &str) -> Result<Arc<dyn CatalogTransport>, TransportError>;
}
