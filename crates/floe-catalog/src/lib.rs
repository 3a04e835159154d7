//! # floe-catalog
//!
//! Idempotent table provisioning and version-checked appends against an
//! Iceberg REST catalog.
//!
//! The crate is organised around three operations:
//!
//! - **Session**: [`CatalogSession::open`] resolves the account, derives the
//!   warehouse and completes the catalog handshake
//! - **Provisioning**: [`TableProvisioner::ensure_table`] creates a table or
//!   adopts an existing one, refusing incompatible schemas
//! - **Append**: [`AppendExecutor::append`] validates and encodes a batch,
//!   then commits it conditional on the table version, retrying conflicts a
//!   bounded number of times
//!
//! ## Transports
//!
//! All catalog traffic goes through [`CatalogTransport`]. The crate ships a
//! REST implementation ([`rest::RestConnector`]) and an in-memory one
//! ([`MemoryCatalog`]) with the same contract. A REST append stages its data
//! file, manifest and manifest list through a [`floe_core::StorageBackend`]
//! ([`aws::S3Backend`] in production) before committing. Catalog requests
//! are signed with `SigV4` using credentials from the AWS default chain.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use floe_catalog::prelude::*;
//! use floe_core::{AccountId, TableIdent};
//!
//! # tokio_test_block_on(async {
//! let catalog = MemoryCatalog::new();
//! let identity = StaticIdentity::new(AccountId::new("123456789012").unwrap());
//! let config = CatalogConfig::new("us-east-2", "demo-bucket");
//! let session = CatalogSession::open(&identity, &catalog, config).await.unwrap();
//!
//! let schema: SchemaSpec = "customer_id:int32?,name:string?".parse().unwrap();
//! let table = TableIdent::parse("analytics.customers").unwrap();
//! let mut handle = TableProvisioner::new(session.clone())
//!     .ensure_table(&table, &schema)
//!     .await
//!     .unwrap();
//!
//! let batch = RecordBatch::new(vec![
//!     Record::new().with("customer_id", 1).with("name", "Alice"),
//! ]);
//! let result = AppendExecutor::new(session, Arc::new(ParquetEncoder::default()))
//!     .append(&mut handle, &batch)
//!     .await
//!     .unwrap();
//! assert_eq!(result.rows_committed, 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod append;
pub mod aws;
pub mod config;
pub mod encoder;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod memory;
pub mod provisioner;
pub mod record;
pub mod rest;
pub mod schema;
pub mod session;
pub mod transport;

// Re-export main types at crate root
pub use append::{AppendExecutor, AppendState, CommitResult};
pub use config::{CatalogConfig, RetryPolicy, SigningConfig};
pub use encoder::{DataFileFormat, EncodedBatch, ParquetEncoder, RecordEncoder};
pub use error::{CatalogError, ErrorKind, Remedy, Result};
pub use identity::{IdentityProvider, StaticIdentity};
pub use memory::{MemoryCatalog, MemorySnapshot, PendingSnapshot};
pub use provisioner::{ProvisionOutcome, TableHandle, TableIdentity, TableProvisioner};
pub use record::{Record, RecordBatch, Value};
pub use schema::{
    ColumnMismatch, FieldSpec, LogicalType, SchemaComparison, SchemaSpec, SchemaWarning,
};
pub use session::CatalogSession;
pub use transport::{
    CatalogConnector, CatalogTransport, CommitOutcome, CreateOutcome, RemoteTable, TableVersion,
    TransportError,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::append::{AppendExecutor, CommitResult};
    pub use crate::config::{CatalogConfig, RetryPolicy};
    pub use crate::encoder::ParquetEncoder;
    pub use crate::error::{CatalogError, Result};
    pub use crate::identity::StaticIdentity;
    pub use crate::memory::MemoryCatalog;
    pub use crate::provisioner::{TableHandle, TableProvisioner};
    pub use crate::record::{Record, RecordBatch, Value};
    pub use crate::schema::{FieldSpec, LogicalType, SchemaSpec};
    pub use crate::session::CatalogSession;
}
