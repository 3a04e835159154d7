//! Ensure command - create or adopt a table.

use anyhow::Result;
use clap::Args;
use floe_catalog::error::Result as CatalogResult;
use floe_catalog::provisioner::{ProvisionOutcome, TableHandle, TableProvisioner};
use floe_catalog::schema::SchemaSpec;
use floe_catalog::session::CatalogSession;
use floe_core::{TableIdent, catalog_span};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::Instrument;

use crate::client::{self, Staging};
use crate::{Config, DEFAULT_SCHEMA, OutputFormat};

/// Arguments for the ensure command.
#[derive(Debug, Args)]
pub struct EnsureArgs {
    /// Table to provision, as `namespace.table`.
    #[arg()]
    pub table: String,

    /// Expected schema as `name:type[?],...`.
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub schema: String,
}

/// Result of provisioning a table.
#[derive(Debug, Clone, Serialize)]
pub struct EnsureReport {
    /// Table identifier.
    pub table: String,
    /// `created` or `adopted`.
    pub outcome: &'static str,
    /// Catalog UUID of the table.
    pub table_uuid: String,
    /// Table location.
    pub location: String,
    /// Current snapshot id, if the table has data.
    pub snapshot_id: Option<i64>,
    /// Records in the table.
    pub total_records: u64,
    /// Nullability and extra-column warnings.
    pub warnings: Vec<String>,
}

impl EnsureReport {
    pub(crate) fn from_handle(handle: &TableHandle) -> Self {
        let remote = handle.remote();
        Self {
            table: handle.ident().to_string(),
            outcome: outcome_name(handle.outcome()),
            table_uuid: remote.table_uuid.to_string(),
            location: remote.location.clone(),
            snapshot_id: handle.version().snapshot_id(),
            total_records: handle.total_records(),
            warnings: super::render_warnings(handle.warnings()),
        }
    }
}

pub(crate) const fn outcome_name(outcome: ProvisionOutcome) -> &'static str {
    match outcome {
        ProvisionOutcome::Created => "created",
        ProvisionOutcome::Adopted => "adopted",
    }
}

/// Execute the ensure command.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the session cannot be
/// opened, or provisioning fails.
pub async fn execute(args: EnsureArgs, config: &Config) -> Result<()> {
    let table = super::parse_table(&args.table)?;
    let schema = super::parse_schema(&args.schema)?;
    let span = catalog_span("ensure_table", &args.table);

    let session = client::connect(config, Staging::Unused)
        .instrument(span.clone())
        .await?;
    let report = ensure(session, &table, &schema).instrument(span).await?;

    match config.format {
        OutputFormat::Json => super::print_json(&report)?,
        OutputFormat::Text => {
            let outcome = match report.outcome {
                "created" => report.outcome.green().to_string(),
                _ => report.outcome.blue().to_string(),
            };
            println!("Table {}: {outcome}", report.table);
            println!();
            println!("  UUID:     {}", report.table_uuid);
            println!("  Location: {}", report.location);
            println!("  Records:  {}", report.total_records);
            for warning in &report.warnings {
                println!("  {} {warning}", "warning:".yellow());
            }
        }
    }
    Ok(())
}

/// Provisions `table` and reports the outcome.
///
/// # Errors
///
/// Propagates the provisioning error.
pub async fn ensure(
    session: CatalogSession,
    table: &TableIdent,
    schema: &SchemaSpec,
) -> CatalogResult<EnsureReport> {
    let handle = TableProvisioner::new(session)
        .ensure_table(table, schema)
        .await?;
    Ok(EnsureReport::from_handle(&handle))
}
