//! # floe-core
//!
//! Shared primitives for the floe catalog client.
//!
//! This crate provides the foundational types used across all floe crates:
//!
//! - **Identifiers**: Validated namespace, table and account identifiers
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization, span helpers, secret redaction
//! - **Storage**: Object storage contract used to stage data files
//!
//! ## Example
//!
//! ```rust
//! use floe_core::prelude::*;
//!
//! let table = TableIdent::parse("myblognamespace.customers_nested").unwrap();
//! assert_eq!(table.namespace().to_string(), "myblognamespace");
//! assert_eq!(table.name(), "customers_nested");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ident;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::ident::{AccountId, NamespaceIdent, TableIdent};
    pub use crate::observability::LogFormat;
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

pub use error::{Error, Result};
pub use ident::{AccountId, NamespaceIdent, TableIdent};
pub use observability::{LogFormat, catalog_span, init_logging};
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult};
