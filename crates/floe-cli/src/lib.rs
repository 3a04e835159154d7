//! # floe-cli
//!
//! Command-line interface for floe.
//!
//! ## Commands
//!
//! - `floe ensure` - Create a table, or adopt a compatible existing one
//! - `floe append` - Append records to a table as one commit
//! - `floe describe` - Show a table's schema and current version
//!
//! ## Configuration
//!
//! Every catalog setting is a flag with a `FLOE_*` environment fallback:
//!
//! - `FLOE_REGION` - Catalog region (falls back to `AWS_REGION`)
//! - `FLOE_TABLE_BUCKET` - Table bucket
//! - `FLOE_ACCOUNT_ID` - Account id; skips the STS lookup when set
//!
//! AWS credentials come from the SDK default provider chain: environment
//! variables, shared config and credentials files (`AWS_PROFILE`), SSO, web
//! identity tokens, and container or instance metadata.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod client;
pub mod commands;
pub mod input;

use std::time::Duration;

use clap::{Parser, Subcommand};
use floe_catalog::config::{CatalogConfig, DEFAULT_CATALOG_NAME, DEFAULT_SIGNING_NAME};
use floe_catalog::error::{CatalogError, ErrorKind};
use floe_core::LogFormat;

/// The schema used when `--schema` is not given.
pub const DEFAULT_SCHEMA: &str = "customer_id:int32,name:string,contact_info:string";

/// Floe CLI - Iceberg table provisioning and appends.
#[derive(Debug, Parser)]
#[command(name = "floe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Catalog region.
    #[arg(long, env = "FLOE_REGION", global = true)]
    pub region: Option<String>,

    /// Catalog name within the account.
    #[arg(long, env = "FLOE_CATALOG", default_value = DEFAULT_CATALOG_NAME, global = true)]
    pub catalog: String,

    /// Table bucket holding the tables.
    #[arg(long, env = "FLOE_TABLE_BUCKET", global = true)]
    pub table_bucket: Option<String>,

    /// Catalog endpoint override.
    #[arg(long, env = "FLOE_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Account id; skips the STS identity lookup.
    #[arg(long, env = "FLOE_ACCOUNT_ID", global = true)]
    pub account_id: Option<String>,

    /// Send catalog requests unsigned.
    #[arg(long, env = "FLOE_NO_SIGV4", global = true)]
    pub no_sigv4: bool,

    /// Service name used when signing catalog requests.
    #[arg(long, env = "FLOE_SIGNING_NAME", default_value = DEFAULT_SIGNING_NAME, global = true)]
    pub signing_name: String,

    /// Upper bound on each catalog round trip, in seconds.
    #[arg(long, env = "FLOE_REQUEST_TIMEOUT_SECS", default_value = "30", global = true)]
    pub timeout_secs: u64,

    /// Commit attempts before giving up on conflicts.
    #[arg(long, env = "FLOE_COMMIT_MAX_ATTEMPTS", default_value = "5", global = true)]
    pub max_attempts: u32,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Log output format.
    #[arg(long, env = "FLOE_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            region: self
                .region
                .clone()
                .or_else(|| std::env::var("AWS_REGION").ok())
                .unwrap_or_default(),
            catalog: self.catalog.clone(),
            table_bucket: self.table_bucket.clone().unwrap_or_default(),
            endpoint: self.endpoint.clone(),
            account_id: self.account_id.clone(),
            sigv4: !self.no_sigv4,
            signing_name: self.signing_name.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a table, or adopt a compatible existing one.
    Ensure(commands::ensure::EnsureArgs),
    /// Append records to a table as one commit.
    Append(commands::append::AppendArgs),
    /// Show a table's schema and current version.
    Describe(commands::describe::DescribeArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Pretty-printed logs.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Catalog region.
    pub region: String,
    /// Catalog name.
    pub catalog: String,
    /// Table bucket.
    pub table_bucket: String,
    /// Catalog endpoint override.
    pub endpoint: Option<String>,
    /// Account id override.
    pub account_id: Option<String>,
    /// Whether catalog requests are signed.
    pub sigv4: bool,
    /// Signing service name.
    pub signing_name: String,
    /// Round-trip timeout.
    pub timeout: Duration,
    /// Commit attempt limit.
    pub max_attempts: u32,
    /// Output format.
    pub format: OutputFormat,
}

impl Config {
    /// Builds the catalog configuration these settings describe.
    #[must_use]
    pub fn catalog_config(&self) -> CatalogConfig {
        let mut config = CatalogConfig::new(&self.region, &self.table_bucket)
            .with_catalog_name(&self.catalog)
            .with_request_timeout(self.timeout);
        config.endpoint.clone_from(&self.endpoint);
        config.signing.enabled = self.sigv4;
        config.signing.signing_name.clone_from(&self.signing_name);
        config.retry.max_attempts = self.max_attempts;
        config
    }
}

/// Finds the catalog error anywhere in the cause chain of `err`.
#[must_use]
pub fn catalog_error(err: &anyhow::Error) -> Option<&CatalogError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CatalogError>())
}

/// Maps a failure to the process exit code.
///
/// Catalog errors get a code per kind so scripts can tell them apart;
/// anything else exits with 1.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    catalog_error(err).map_or(1, |err| match err.kind() {
        ErrorKind::Auth => 2,
        ErrorKind::Transport => 3,
        ErrorKind::Load => 4,
        ErrorKind::SchemaMismatch => 5,
        ErrorKind::Validation => 6,
        ErrorKind::CommitConflict => 7,
        ErrorKind::Encoding => 8,
        ErrorKind::InvalidConfig => 9,
    })
}
