//! Describe command - show a table's schema and version.

use anyhow::Result;
use clap::Args;
use floe_catalog::error::Result as CatalogResult;
use floe_catalog::provisioner::TableProvisioner;
use floe_catalog::session::CatalogSession;
use floe_core::{TableIdent, catalog_span};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::Instrument;

use crate::client::{self, Staging};
use crate::{Config, OutputFormat};

/// Arguments for the describe command.
#[derive(Debug, Args)]
pub struct DescribeArgs {
    /// Table to describe, as `namespace.table`.
    #[arg()]
    pub table: String,
}

/// One column of a described table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReport {
    /// Column name.
    pub name: String,
    /// Iceberg type name.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Whether the column accepts nulls.
    pub nullable: bool,
    /// Catalog-assigned field id.
    pub field_id: Option<i32>,
}

/// A table as the catalog currently sees it.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeReport {
    /// Table identifier.
    pub table: String,
    /// Catalog UUID.
    pub table_uuid: String,
    /// Table location.
    pub location: String,
    /// Current metadata file, if reported.
    pub metadata_location: Option<String>,
    /// Current schema id.
    pub schema_id: i32,
    /// Columns in schema order.
    pub columns: Vec<ColumnReport>,
    /// Current snapshot id, if the table has data.
    pub snapshot_id: Option<i64>,
    /// Records in the table.
    pub total_records: u64,
}

/// Execute the describe command.
///
/// # Errors
///
/// Returns an error if the table identifier is invalid, the session cannot
/// be opened, or the table cannot be loaded.
pub async fn execute(args: DescribeArgs, config: &Config) -> Result<()> {
    let table = super::parse_table(&args.table)?;
    let span = catalog_span("load_table", &args.table);

    let session = client::connect(config, Staging::Unused)
        .instrument(span.clone())
        .await?;
    let report = describe(session, &table).instrument(span).await?;

    match config.format {
        OutputFormat::Json => super::print_json(&report)?,
        OutputFormat::Text => {
            println!("Table: {}", report.table.bold());
            println!("UUID: {}", report.table_uuid);
            println!("Location: {}", report.location);
            match report.snapshot_id {
                Some(id) => println!("Snapshot: {id} ({} records)", report.total_records),
                None => println!("Snapshot: {}", "none".dimmed()),
            }
            println!();
            println!("Schema {}:", report.schema_id);
            for column in &report.columns {
                let nullability = if column.nullable {
                    "optional".dimmed().to_string()
                } else {
                    "required".to_string()
                };
                println!("  {:<24} {:<12} {nullability}", column.name, column.column_type);
            }
        }
    }
    Ok(())
}

/// Loads `table` and reports its schema and version.
///
/// # Errors
///
/// Returns [`floe_catalog::CatalogError::Load`] if the table does not exist.
pub async fn describe(session: CatalogSession, table: &TableIdent) -> CatalogResult<DescribeReport> {
    let remote = TableProvisioner::new(session).load(table).await?;
    tracing::info!(table = %remote.ident, schema = %remote.schema, "table schema");

    Ok(DescribeReport {
        table: remote.ident.to_string(),
        table_uuid: remote.table_uuid.to_string(),
        location: remote.location.clone(),
        metadata_location: remote.metadata_location.clone(),
        schema_id: remote.schema_id,
        columns: remote
            .schema
            .fields()
            .iter()
            .map(|field| ColumnReport {
                name: field.name.clone(),
                column_type: field.logical_type.iceberg_name().to_string(),
                nullable: field.nullable,
                field_id: field.field_id,
            })
            .collect(),
        snapshot_id: remote.version.snapshot_id(),
        total_records: remote.total_records,
    })
}
