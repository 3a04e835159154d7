//! Iceberg REST catalog wire types.
//!
//! Table metadata, schemas, snapshots, commit requirements and updates are
//! the `iceberg` crate's spec types. This module adds the request and
//! response envelopes floe sends or reads, plus conversions between
//! Iceberg schemas and [`SchemaSpec`].

use std::collections::HashMap;
use std::sync::Arc;

use floe_core::{NamespaceIdent, TableIdent};
use iceberg::spec::{NestedField, Schema, Snapshot, TableMetadata, Type};
use iceberg::{TableRequirement, TableUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{FieldSpec, LogicalType, SchemaSpec};
use crate::transport::{RemoteTable, TableVersion, TransportError};

/// Branch every append targets.
pub const MAIN_BRANCH: &str = "main";

/// Response from `GET /v1/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    /// Default configuration values.
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    /// Configuration overrides (take precedence over defaults).
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl ConfigResponse {
    /// Returns the path prefix to use for catalog routes, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.overrides
            .get("prefix")
            .or_else(|| self.defaults.get("prefix"))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// Request body for `POST /v1/{prefix}/namespaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNamespaceRequest {
    /// Namespace levels.
    pub namespace: NamespaceIdent,
    /// Namespace properties.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Request body for `POST /v1/{prefix}/namespaces/{namespace}/tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    /// Table name.
    pub name: String,
    /// Table schema.
    pub schema: Schema,
    /// Whether to stage the create without committing it.
    #[serde(rename = "stage-create", default)]
    pub stage_create: bool,
    /// Table properties.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

/// Response from loading (or creating) a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTableResult {
    /// Location of the current metadata file.
    #[serde(rename = "metadata-location", default)]
    pub metadata_location: Option<String>,
    /// Table metadata.
    pub metadata: TableMetadata,
    /// Table-specific client configuration.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl LoadTableResult {
    /// Converts the wire response into a [`RemoteTable`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidResponse`] if the current schema has
    /// empty or duplicate column names.
    pub fn into_remote(self, ident: TableIdent) -> Result<RemoteTable, TransportError> {
        let metadata = self.metadata;
        let schema = from_iceberg_schema(metadata.current_schema()).map_err(|e| {
            TransportError::InvalidResponse {
                message: format!("schema of {ident}: {e}"),
            }
        })?;
        let current = metadata.current_snapshot();

        Ok(RemoteTable {
            ident,
            table_uuid: metadata.uuid(),
            location: metadata.location().to_string(),
            metadata_location: self.metadata_location,
            schema,
            schema_id: metadata.current_schema_id(),
            version: TableVersion::new(current.map(|s| s.snapshot_id())),
            manifest_list: current.map(|s| s.manifest_list().to_string()),
            last_sequence_number: metadata.last_sequence_number(),
            total_records: current.and_then(|s| total_records(s)).unwrap_or(0),
        })
    }
}

/// Returns the `total-records` summary value of a snapshot, if present and
/// numeric.
#[must_use]
pub fn total_records(snapshot: &Snapshot) -> Option<u64> {
    snapshot
        .summary()
        .additional_properties
        .get("total-records")
        .and_then(|v| v.parse().ok())
}

/// Builds an Iceberg schema, assigning field ids where missing.
///
/// # Errors
///
/// Returns [`TransportError::Rejected`] if a column type is not a valid
/// Iceberg type or the field ids collide.
pub fn to_iceberg_schema(spec: &SchemaSpec, schema_id: i32) -> Result<Schema, TransportError> {
    let spec = spec.with_assigned_ids();
    let fields = spec
        .fields()
        .iter()
        .map(|f| {
            let field_type = iceberg_type(&f.logical_type)?;
            Ok(Arc::new(NestedField::new(
                f.field_id.unwrap_or_default(),
                f.name.clone(),
                field_type,
                !f.nullable,
            )))
        })
        .collect::<Result<Vec<_>, TransportError>>()?;
    Schema::builder()
        .with_schema_id(schema_id)
        .with_fields(fields)
        .build()
        .map_err(|e| invalid_schema(&e))
}

fn iceberg_type(logical_type: &LogicalType) -> Result<Type, TransportError> {
    let raw = logical_type.iceberg_name();
    // Unsupported nested types are kept as their JSON text.
    serde_json::from_str::<Type>(raw)
        .or_else(|_| serde_json::from_value::<Type>(Value::String(raw.to_string())))
        .map_err(|e| invalid_schema(&e))
}

fn invalid_schema(err: &dyn std::error::Error) -> TransportError {
    TransportError::Rejected {
        status: 0,
        message: format!("invalid schema: {err}"),
    }
}

/// Converts an Iceberg schema into a [`SchemaSpec`].
///
/// Nested and parameterized types become [`LogicalType::Unsupported`].
///
/// # Errors
///
/// Returns an error if column names are empty or duplicated.
pub fn from_iceberg_schema(schema: &Schema) -> crate::error::Result<SchemaSpec> {
    SchemaSpec::new(
        schema
            .as_struct()
            .fields()
            .iter()
            .map(|f| FieldSpec {
                name: f.name.clone(),
                logical_type: match serde_json::to_value(f.field_type.as_ref()) {
                    Ok(Value::String(name)) => LogicalType::from_iceberg(&name),
                    Ok(other) => LogicalType::Unsupported(other.to_string()),
                    Err(_) => LogicalType::Unsupported(f.field_type.to_string()),
                },
                nullable: !f.required,
                field_id: Some(f.id),
            })
            .collect(),
    )
}

/// Request body for `POST /v1/{prefix}/namespaces/{namespace}/tables/{table}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitTableRequest {
    /// Table being committed.
    pub identifier: TableIdent,
    /// Requirements checked before applying updates.
    pub requirements: Vec<TableRequirement>,
    /// Updates to apply.
    pub updates: Vec<TableUpdate>,
}

impl CommitTableRequest {
    /// Returns the expected main-branch snapshot, if the request asserts one.
    #[must_use]
    pub fn expected_version(&self) -> Option<TableVersion> {
        self.requirements.iter().find_map(|r| match r {
            TableRequirement::RefSnapshotIdMatch { r#ref, snapshot_id } if r#ref == MAIN_BRANCH => {
                Some(TableVersion::new(*snapshot_id))
            }
            _ => None,
        })
    }

    /// Returns the table UUID the request asserts, if any.
    #[must_use]
    pub fn expected_uuid(&self) -> Option<uuid::Uuid> {
        self.requirements.iter().find_map(|r| match r {
            TableRequirement::UuidMatch { uuid } => Some(*uuid),
            _ => None,
        })
    }

    /// Returns the snapshot added by this request.
    #[must_use]
    pub fn added_snapshot(&self) -> Option<&Snapshot> {
        self.updates.iter().find_map(|u| match u {
            TableUpdate::AddSnapshot { snapshot } => Some(snapshot),
            _ => None,
        })
    }

    /// Returns the snapshot `main` is moved to, if the request moves it.
    #[must_use]
    pub fn main_target(&self) -> Option<i64> {
        self.updates.iter().find_map(|u| match u {
            TableUpdate::SetSnapshotRef {
                ref_name,
                reference,
            } if ref_name == MAIN_BRANCH => Some(reference.snapshot_id),
            _ => None,
        })
    }
}

/// Response from a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitTableResponse {
    /// Location of the new metadata file.
    #[serde(rename = "metadata-location")]
    pub metadata_location: String,
    /// New table metadata.
    pub metadata: TableMetadata,
}

/// Error envelope returned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorModel,
}

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorModel {
    /// Human-readable message.
    pub message: String,
    /// Exception type, e.g. `CommitFailedException`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// HTTP status code.
    pub code: u16,
}

impl ErrorResponse {
    /// Builds an error envelope.
    #[must_use]
    pub fn new(code: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorModel {
                message: message.into(),
                error_type: error_type.into(),
                code,
            },
        }
    }
}
