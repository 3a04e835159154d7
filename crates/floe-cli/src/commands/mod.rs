//! CLI command implementations.
//!
//! Each command splits into `execute`, which connects and prints, and a
//! function returning a serializable report, which tests drive directly.

pub mod append;
pub mod describe;
pub mod ensure;

use anyhow::{Context, Result};
use floe_catalog::schema::{SchemaSpec, SchemaWarning};
use floe_core::TableIdent;
use serde::Serialize;

fn parse_table(raw: &str) -> Result<TableIdent> {
    TableIdent::parse(raw)
        .with_context(|| format!("'{raw}' is not a table identifier of the form namespace.table"))
}

fn parse_schema(raw: &str) -> Result<SchemaSpec> {
    Ok(raw.parse::<SchemaSpec>()?)
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("Failed to serialize report")?
    );
    Ok(())
}

fn render_warnings(warnings: &[SchemaWarning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}
