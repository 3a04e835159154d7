//! Logical table schemas and remote schema comparison.
//!
//! A [`SchemaSpec`] is the schema the caller expects. Comparing it against the
//! schema the catalog actually holds is order-insensitive: columns are matched
//! by name. The outcome separates hard mismatches (which block provisioning)
//! from warnings (which are logged and carried on the table handle).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Column types floe can write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Boolean.
    Boolean,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// UTF-8 string.
    String,
    /// A remote type floe cannot write, kept verbatim for reporting.
    Unsupported(String),
}

impl LogicalType {
    /// Returns the Iceberg primitive type name.
    #[must_use]
    pub fn iceberg_name(&self) -> &str {
        match self {
            Self::Boolean => "boolean",
            Self::Int32 => "int",
            Self::Int64 => "long",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::String => "string",
            Self::Unsupported(raw) => raw,
        }
    }

    /// Maps an Iceberg primitive type name to a logical type.
    ///
    /// Anything that is not one of the writable primitives comes back as
    /// [`LogicalType::Unsupported`].
    #[must_use]
    pub fn from_iceberg(name: &str) -> Self {
        match name {
            "boolean" => Self::Boolean,
            "int" => Self::Int32,
            "long" => Self::Int64,
            "float" => Self::Float32,
            "double" => Self::Float64,
            "string" => Self::String,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Returns true if values of this type can be written.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::Unsupported(raw) => write!(f, "unsupported({raw})"),
        }
    }
}

impl FromStr for LogicalType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "int" | "int32" => Ok(Self::Int32),
            "long" | "int64" => Ok(Self::Int64),
            "float" | "float32" => Ok(Self::Float32),
            "double" | "float64" => Ok(Self::Float64),
            "string" | "str" => Ok(Self::String),
            other => Err(CatalogError::config(format!("unknown column type '{other}'"))),
        }
    }
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name.
    pub name: String,
    /// Column type.
    pub logical_type: LogicalType,
    /// Whether the column accepts nulls.
    pub nullable: bool,
    /// Catalog-assigned field id, absent on locally built schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<i32>,
}

impl FieldSpec {
    /// Creates a non-nullable column.
    #[must_use]
    pub fn required(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: false,
            field_id: None,
        }
    }

    /// Creates a nullable column.
    #[must_use]
    pub fn optional(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            field_id: None,
        }
    }

    /// Sets the field id.
    #[must_use]
    pub const fn with_field_id(mut self, id: i32) -> Self {
        self.field_id = Some(id);
        self
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.logical_type)?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// An ordered list of uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSpec {
    fields: Vec<FieldSpec>,
}

impl SchemaSpec {
    /// Creates a schema after checking that column names are non-empty and
    /// unique.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidConfig`] for an empty schema, an empty
    /// column name, or a duplicate column name.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(CatalogError::config("schema must have at least one column"));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(CatalogError::config("column names cannot be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CatalogError::config(format!(
                    "duplicate column '{}' in schema",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Returns the columns in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a copy with field ids `1..=n` filled in where missing.
    ///
    /// Catalogs reassign ids on create, but the request still has to carry
    /// a unique id per column.
    #[must_use]
    pub fn with_assigned_ids(&self) -> Self {
        let mut next = self
            .fields
            .iter()
            .filter_map(|f| f.field_id)
            .max()
            .unwrap_or(0);
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let mut f = f.clone();
                if f.field_id.is_none() {
                    next += 1;
                    f.field_id = Some(next);
                }
                f
            })
            .collect();
        Self { fields }
    }

    /// Compares this (expected) schema against a remote schema.
    #[must_use]
    pub fn compare(&self, remote: &Self) -> SchemaComparison {
        let remote_by_name: HashMap<&str, &FieldSpec> =
            remote.fields.iter().map(|f| (f.name.as_str(), f)).collect();

        let mut comparison = SchemaComparison::default();

        for expected in &self.fields {
            let Some(found) = remote_by_name.get(expected.name.as_str()) else {
                comparison.mismatches.push(ColumnMismatch::Missing {
                    name: expected.name.clone(),
                    expected: expected.logical_type.clone(),
                });
                continue;
            };
            if found.logical_type != expected.logical_type {
                comparison.mismatches.push(ColumnMismatch::TypeChanged {
                    name: expected.name.clone(),
                    expected: expected.logical_type.clone(),
                    found: found.logical_type.clone(),
                });
                continue;
            }
            if found.nullable != expected.nullable {
                comparison.warnings.push(SchemaWarning::NullabilityDrift {
                    name: expected.name.clone(),
                    expected_nullable: expected.nullable,
                    remote_nullable: found.nullable,
                });
            }
        }

        for extra in remote
            .fields
            .iter()
            .filter(|f| self.field(&f.name).is_none())
        {
            if extra.nullable {
                comparison.warnings.push(SchemaWarning::ExtraOptionalColumn {
                    name: extra.name.clone(),
                    found: extra.logical_type.clone(),
                });
            } else {
                comparison.mismatches.push(ColumnMismatch::UnexpectedRequired {
                    name: extra.name.clone(),
                    found: extra.logical_type.clone(),
                });
            }
        }

        comparison
    }
}

impl fmt::Display for SchemaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Parses `name:type[?],name:type[?],...`; a trailing `?` marks the column
/// nullable.
impl FromStr for SchemaSpec {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let fields = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (name, ty) = part.split_once(':').ok_or_else(|| {
                    CatalogError::config(format!("column '{part}' must have the form name:type"))
                })?;
                let (ty, nullable) = match ty.trim().strip_suffix('?') {
                    Some(ty) => (ty, true),
                    None => (ty, false),
                };
                Ok(FieldSpec {
                    name: name.trim().to_string(),
                    logical_type: ty.parse()?,
                    nullable,
                    field_id: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }
}

/// A column difference that makes the remote table unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnMismatch {
    /// An expected column is absent remotely.
    Missing {
        /// Column name.
        name: String,
        /// Expected type.
        expected: LogicalType,
    },
    /// A column exists remotely with a different type.
    TypeChanged {
        /// Column name.
        name: String,
        /// Expected type.
        expected: LogicalType,
        /// Remote type.
        found: LogicalType,
    },
    /// The remote table has a required column the batch can never fill.
    UnexpectedRequired {
        /// Column name.
        name: String,
        /// Remote type.
        found: LogicalType,
    },
}

impl fmt::Display for ColumnMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name, expected } => {
                write!(f, "column '{name}' ({expected}) is missing")
            }
            Self::TypeChanged {
                name,
                expected,
                found,
            } => write!(f, "column '{name}' is {found}, expected {expected}"),
            Self::UnexpectedRequired { name, found } => {
                write!(f, "unexpected required column '{name}' ({found})")
            }
        }
    }
}

/// A column difference that is tolerated but reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaWarning {
    /// Types agree but nullability differs.
    NullabilityDrift {
        /// Column name.
        name: String,
        /// Nullability in the expected schema.
        expected_nullable: bool,
        /// Nullability in the remote schema.
        remote_nullable: bool,
    },
    /// The remote table has an extra optional column that will be left null.
    ExtraOptionalColumn {
        /// Column name.
        name: String,
        /// Remote type.
        found: LogicalType,
    },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullabilityDrift {
                name,
                expected_nullable,
                remote_nullable,
            } => write!(
                f,
                "column '{name}' nullability differs (expected {}, remote {})",
                nullability(*expected_nullable),
                nullability(*remote_nullable)
            ),
            Self::ExtraOptionalColumn { name, found } => {
                write!(f, "remote table has extra optional column '{name}' ({found})")
            }
        }
    }
}

const fn nullability(nullable: bool) -> &'static str {
    if nullable { "optional" } else { "required" }
}

/// Result of comparing an expected schema against a remote one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaComparison {
    /// Incompatible columns.
    pub mismatches: Vec<ColumnMismatch>,
    /// Tolerated differences.
    pub warnings: Vec<SchemaWarning>,
}

impl SchemaComparison {
    /// Returns true if there are no hard mismatches.
    #[must_use]
    pub fn is_compatible(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> SchemaSpec {
        SchemaSpec::new(vec![
            FieldSpec::optional("customer_id", LogicalType::Int32),
            FieldSpec::optional("name", LogicalType::String),
            FieldSpec::optional("contact_info", LogicalType::String),
        ])
        .unwrap()
    }

    #[test]
    fn parses_schema_syntax() {
        let schema: SchemaSpec = "customer_id:int32?, name:string, score:double?"
            .parse()
            .unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(
            schema.field("customer_id"),
            Some(&FieldSpec::optional("customer_id", LogicalType::Int32))
        );
        assert!(!schema.field("name").unwrap().nullable);
        assert_eq!(schema.field("score").unwrap().logical_type, LogicalType::Float64);
        assert_eq!(schema.to_string(), "customer_id:int32?,name:string,score:float64?");
    }

    #[test]
    fn rejects_bad_schemas() {
        assert!("".parse::<SchemaSpec>().is_err());
        assert!("a:int32,a:string".parse::<SchemaSpec>().is_err());
        assert!("a".parse::<SchemaSpec>().is_err());
        assert!("a:decimal".parse::<SchemaSpec>().is_err());
        assert!(":int32".parse::<SchemaSpec>().is_err());
    }

    #[test]
    fn compare_identical_is_clean() {
        let comparison = customers().compare(&customers());
        assert!(comparison.is_compatible());
        assert!(comparison.warnings.is_empty());
    }

    #[test]
    fn compare_ignores_column_order() {
        let mut fields = customers().fields().to_vec();
        fields.reverse();
        let reordered = SchemaSpec::new(fields).unwrap();
        let comparison = customers().compare(&reordered);
        assert!(comparison.is_compatible());
        assert!(comparison.warnings.is_empty());
    }

    #[test]
    fn compare_reports_type_change_and_missing() {
        let remote = SchemaSpec::new(vec![
            FieldSpec::optional("customer_id", LogicalType::String),
            FieldSpec::optional("contact_info", LogicalType::String),
        ])
        .unwrap();
        let comparison = customers().compare(&remote);
        assert_eq!(
            comparison.mismatches,
            vec![
                ColumnMismatch::TypeChanged {
                    name: "customer_id".into(),
                    expected: LogicalType::Int32,
                    found: LogicalType::String,
                },
                ColumnMismatch::Missing {
                    name: "name".into(),
                    expected: LogicalType::String,
                },
            ]
        );
    }

    #[test]
    fn compare_nullability_drift_is_warning() {
        let remote = SchemaSpec::new(vec![
            FieldSpec::required("customer_id", LogicalType::Int32),
            FieldSpec::optional("name", LogicalType::String),
            FieldSpec::optional("contact_info", LogicalType::String),
        ])
        .unwrap();
        let comparison = customers().compare(&remote);
        assert!(comparison.is_compatible());
        assert_eq!(
            comparison.warnings,
            vec![SchemaWarning::NullabilityDrift {
                name: "customer_id".into(),
                expected_nullable: true,
                remote_nullable: false,
            }]
        );
    }

    #[test]
    fn compare_extra_columns() {
        let mut fields = customers().fields().to_vec();
        fields.push(FieldSpec::optional("region", LogicalType::String));
        let remote = SchemaSpec::new(fields.clone()).unwrap();
        let comparison = customers().compare(&remote);
        assert!(comparison.is_compatible());
        assert!(matches!(
            comparison.warnings.as_slice(),
            [SchemaWarning::ExtraOptionalColumn { name, .. }] if name == "region"
        ));

        fields.push(FieldSpec::required("tenant", LogicalType::Int64));
        let remote = SchemaSpec::new(fields).unwrap();
        let comparison = customers().compare(&remote);
        assert!(!comparison.is_compatible());
        assert!(matches!(
            comparison.mismatches.as_slice(),
            [ColumnMismatch::UnexpectedRequired { name, .. }] if name == "tenant"
        ));
    }

    #[test]
    fn unsupported_remote_type_is_mismatch() {
        let remote = SchemaSpec::new(vec![
            FieldSpec::optional("customer_id", LogicalType::Int32),
            FieldSpec::optional("name", LogicalType::String),
            FieldSpec::optional("contact_info", LogicalType::from_iceberg("decimal(9,2)")),
        ])
        .unwrap();
        let comparison = customers().compare(&remote);
        assert_eq!(comparison.mismatches.len(), 1);
        assert!(!LogicalType::from_iceberg("timestamptz").is_writable());
    }

    #[test]
    fn assigns_field_ids() {
        let schema = customers().with_assigned_ids();
        let ids: Vec<_> = schema.fields().iter().map(|f| f.field_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn iceberg_names_round_trip() {
        for ty in [
            LogicalType::Boolean,
            LogicalType::Int32,
            LogicalType::Int64,
            LogicalType::Float32,
            LogicalType::Float64,
            LogicalType::String,
        ] {
            assert_eq!(LogicalType::from_iceberg(ty.iceberg_name()), ty);
        }
    }
}
