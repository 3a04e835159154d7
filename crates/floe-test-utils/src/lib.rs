//! Shared test utilities for floe integration tests.
//!
//! This crate provides:
//! - [`TracingTransport`]: In-memory catalog transport with operation
//!   recording, conflict and failure injection, and simulated latency
//! - [`MockRestCatalog`]: An axum server speaking the Iceberg REST protocol
//! - Fixtures for the customers table used across tests
//!
//! # Example
//!
//! ```rust,ignore
//! use floe_test_utils::{TracingTransport, customers_schema, open_session};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = TracingTransport::new();
//!     let session = open_session(&transport).await;
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod mock_rest;
pub mod transport;

pub use fixtures::*;
pub use mock_rest::*;
pub use transport::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("floe_core=debug".parse().expect("valid directive"))
                .add_directive("floe_catalog=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
