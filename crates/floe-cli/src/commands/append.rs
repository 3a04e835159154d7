//! Append command - commit a batch of records.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use floe_catalog::append::AppendExecutor;
use floe_catalog::encoder::ParquetEncoder;
use floe_catalog::error::Result as CatalogResult;
use floe_catalog::provisioner::TableProvisioner;
use floe_catalog::record::RecordBatch;
use floe_catalog::schema::SchemaSpec;
use floe_catalog::session::CatalogSession;
use floe_core::{TableIdent, catalog_span};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::Instrument;

use crate::client::{self, Staging};
use crate::{Config, DEFAULT_SCHEMA, OutputFormat, input};

/// Arguments for the append command.
#[derive(Debug, Args)]
pub struct AppendArgs {
    /// Table to append to, as `namespace.table`.
    #[arg()]
    pub table: String,

    /// File of records: a JSON array or JSON lines. `-` reads stdin.
    #[arg(long, short = 'f', conflicts_with = "records", required_unless_present = "records")]
    pub file: Option<PathBuf>,

    /// Records given inline, in the same formats as `--file`.
    #[arg(long, short = 'r')]
    pub records: Option<String>,

    /// Expected schema as `name:type[?],...`.
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub schema: String,
}

impl AppendArgs {
    fn read_input(&self) -> Result<String> {
        match (&self.records, &self.file) {
            (Some(records), _) => Ok(records.clone()),
            (None, Some(path)) if path.as_os_str() == "-" => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("Failed to read records from stdin")?;
                Ok(text)
            }
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read records from {}", path.display())),
            (None, None) => anyhow::bail!("Either --file or --records is required"),
        }
    }
}

/// Result of an append.
#[derive(Debug, Clone, Serialize)]
pub struct AppendReport {
    /// Table identifier.
    pub table: String,
    /// Whether the table was `created` or `adopted` before appending.
    pub provisioned: &'static str,
    /// Records added by this append.
    pub rows_committed: u64,
    /// Snapshot the batch was committed on top of.
    pub previous_snapshot_id: Option<i64>,
    /// The new snapshot.
    pub snapshot_id: Option<i64>,
    /// Commit attempts used.
    pub attempts: u32,
    /// Records in the table after the commit.
    pub total_records: u64,
    /// Schema warnings raised while provisioning.
    pub warnings: Vec<String>,
}

/// Execute the append command.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, the session
/// cannot be opened, or provisioning or the append fails.
pub async fn execute(args: AppendArgs, config: &Config) -> Result<()> {
    let table = super::parse_table(&args.table)?;
    let schema = super::parse_schema(&args.schema)?;
    let batch = input::parse_records(&args.read_input()?, &schema)?;
    let span = catalog_span("append", &args.table);

    let session = client::connect(config, Staging::Required)
        .instrument(span.clone())
        .await?;
    let report = append(session, &table, &schema, &batch)
        .instrument(span)
        .await?;

    match config.format {
        OutputFormat::Json => super::print_json(&report)?,
        OutputFormat::Text => {
            for warning in &report.warnings {
                println!("{} {warning}", "warning:".yellow());
            }
            println!(
                "{} {} records to {}",
                "Committed".green(),
                report.rows_committed,
                report.table
            );
            println!();
            if let Some(snapshot) = report.snapshot_id {
                println!("  Snapshot: {snapshot}");
            }
            println!("  Attempts: {}", report.attempts);
            println!("  Total:    {} records", report.total_records);
        }
    }
    Ok(())
}

/// Provisions `table`, then appends `batch` to it as one commit.
///
/// # Errors
///
/// Propagates provisioning and append errors.
pub async fn append(
    session: CatalogSession,
    table: &TableIdent,
    schema: &SchemaSpec,
    batch: &RecordBatch,
) -> CatalogResult<AppendReport> {
    let mut handle = TableProvisioner::new(session.clone())
        .ensure_table(table, schema)
        .await?;
    let result = AppendExecutor::new(session, Arc::new(ParquetEncoder::default()))
        .append(&mut handle, batch)
        .await?;

    Ok(AppendReport {
        table: result.table.to_string(),
        provisioned: super::ensure::outcome_name(handle.outcome()),
        rows_committed: result.rows_committed,
        previous_snapshot_id: result.previous_version.snapshot_id(),
        snapshot_id: result.version.snapshot_id(),
        attempts: result.attempts,
        total_records: result.total_records,
        warnings: super::render_warnings(handle.warnings()),
    })
}
