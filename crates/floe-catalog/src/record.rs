//! Records, batches and batch validation.
//!
//! A [`Record`] maps column names to typed [`Value`]s. Validation against the
//! table schema happens before anything is encoded or sent, so a bad batch
//! never costs a network round trip.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CatalogError, Result};
use crate::schema::{LogicalType, SchemaSpec};

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
}

impl Value {
    /// Returns the logical type of a non-null value.
    #[must_use]
    pub const fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(LogicalType::Boolean),
            Self::Int32(_) => Some(LogicalType::Int32),
            Self::Int64(_) => Some(LogicalType::Int64),
            Self::Float32(_) => Some(LogicalType::Float32),
            Self::Float64(_) => Some(LogicalType::Float64),
            Self::String(_) => Some(LogicalType::String),
        }
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a JSON value into a value of the given column type.
    ///
    /// Objects and arrays destined for a string column are stored as their
    /// compact JSON text, which is how nested payloads such as contact details
    /// land in a flat table.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch if the JSON value cannot be
    /// represented as `ty`.
    pub fn from_json(json: &serde_json::Value, ty: &LogicalType) -> std::result::Result<Self, String> {
        use serde_json::Value as Json;

        let mismatch = || format!("expected {ty}, got {}", json_kind(json));
        match (ty, json) {
            (_, Json::Null) => Ok(Self::Null),
            (LogicalType::Boolean, Json::Bool(b)) => Ok(Self::Boolean(*b)),
            (LogicalType::Int32, Json::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Int32)
                .ok_or_else(|| format!("{n} does not fit in int32")),
            (LogicalType::Int64, Json::Number(n)) => n
                .as_i64()
                .map(Self::Int64)
                .ok_or_else(|| format!("{n} does not fit in int64")),
            #[allow(clippy::cast_possible_truncation)]
            (LogicalType::Float32, Json::Number(n)) => {
                n.as_f64().map(|v| Self::Float32(v as f32)).ok_or_else(mismatch)
            }
            (LogicalType::Float64, Json::Number(n)) => {
                n.as_f64().map(Self::Float64).ok_or_else(mismatch)
            }
            (LogicalType::String, Json::String(s)) => Ok(Self::String(s.clone())),
            (LogicalType::String, Json::Object(_) | Json::Array(_)) => {
                Ok(Self::String(json.to_string()))
            }
            (LogicalType::Unsupported(raw), _) => {
                Err(format!("column type {raw} cannot be written"))
            }
            _ => Err(mismatch()),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One row: column name to value.
///
/// Columns left out are treated as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Returns a column value, if set.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Iterates over the set columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts a JSON object into a record typed by `schema`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem: a non-object input, a key
    /// that is not a schema column, or a value of the wrong type.
    pub fn from_json(
        json: &serde_json::Value,
        schema: &SchemaSpec,
    ) -> std::result::Result<Self, String> {
        let object = json
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", json_kind(json)))?;

        let mut record = Self::new();
        for (key, value) in object {
            let field = schema
                .field(key)
                .ok_or_else(|| format!("unexpected column '{key}'"))?;
            let value = Value::from_json(value, &field.logical_type)
                .map_err(|e| format!("column '{key}': {e}"))?;
            record.insert(key.clone(), value);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// An ordered batch of records appended as one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    /// Creates a batch from records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Returns the records in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Builds a batch from a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] if the input is not an array or an
    /// element cannot be converted.
    pub fn from_json(json: &serde_json::Value, schema: &SchemaSpec) -> Result<Self> {
        let items = json.as_array().ok_or_else(|| CatalogError::Validation {
            message: format!("expected a JSON array of records, got {}", json_kind(json)),
            record: None,
        })?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Record::from_json(item, schema).map_err(|e| CatalogError::invalid_record(i, e))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Checks every record against the schema.
    ///
    /// Rejects an empty batch, columns the schema does not have, missing or
    /// null values for required columns, and values whose type differs from
    /// the column type. No numeric widening is applied.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] naming the first offending record.
    pub fn validate(&self, schema: &SchemaSpec) -> Result<()> {
        if self.records.is_empty() {
            return Err(CatalogError::Validation {
                message: "batch contains no records".into(),
                record: None,
            });
        }

        for (index, record) in self.records.iter().enumerate() {
            for (column, _) in record.iter() {
                if schema.field(column).is_none() {
                    return Err(CatalogError::invalid_record(
                        index,
                        format!("unexpected column '{column}'"),
                    ));
                }
            }

            for field in schema.fields() {
                match record.get(&field.name) {
                    None | Some(Value::Null) => {
                        if !field.nullable {
                            return Err(CatalogError::invalid_record(
                                index,
                                format!("required column '{}' is missing or null", field.name),
                            ));
                        }
                    }
                    Some(value) => {
                        if !field.logical_type.is_writable() {
                            return Err(CatalogError::invalid_record(
                                index,
                                format!(
                                    "column '{}' has type {} which cannot be written",
                                    field.name, field.logical_type
                                ),
                            ));
                        }
                        if value.logical_type().as_ref() != Some(&field.logical_type) {
                            return Err(CatalogError::invalid_record(
                                index,
                                format!(
                                    "column '{}' expects {}, got {value}",
                                    field.name, field.logical_type
                                ),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<Record> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn schema() -> SchemaSpec {
        SchemaSpec::new(vec![
            FieldSpec::required("customer_id", LogicalType::Int32),
            FieldSpec::optional("name", LogicalType::String),
            FieldSpec::optional("contact_info", LogicalType::String),
        ])
        .unwrap()
    }

    fn alice() -> Record {
        Record::new()
            .with("customer_id", 1)
            .with("name", "Alice")
            .with("contact_info", r#"{"email":"alice@example.com"}"#)
    }

    #[test]
    fn valid_batch_passes() {
        let batch = RecordBatch::new(vec![alice(), Record::new().with("customer_id", 2)]);
        batch.validate(&schema()).expect("valid batch");
    }

    #[test]
    fn empty_batch_rejected() {
        let err = RecordBatch::default().validate(&schema()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: None, .. }));
    }

    #[test]
    fn unexpected_column_rejected() {
        let batch = RecordBatch::new(vec![alice(), alice().with("age", 30)]);
        let err = batch.validate(&schema()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: Some(1), .. }));
        assert!(err.to_string().contains("unexpected column 'age'"));
    }

    #[test]
    fn required_null_rejected() {
        let batch = RecordBatch::new(vec![alice().with("customer_id", Value::Null)]);
        let err = batch.validate(&schema()).unwrap_err();
        assert!(err.to_string().contains("required column 'customer_id'"));

        let batch = RecordBatch::new(vec![Record::new().with("name", "nobody")]);
        assert!(batch.validate(&schema()).is_err());
    }

    #[test]
    fn type_mismatch_rejected() {
        let batch = RecordBatch::new(vec![alice().with("customer_id", "1")]);
        let err = batch.validate(&schema()).unwrap_err();
        assert!(err.to_string().contains("expects int32"));

        // No implicit widening.
        let batch = RecordBatch::new(vec![alice().with("customer_id", 1_i64)]);
        assert!(batch.validate(&schema()).is_err());
    }

    #[test]
    fn json_nested_payload_is_stringified() {
        let json = json!([
            {"customer_id": 1, "name": "Alice", "contact_info": {"email": "alice@example.com", "phone": "555-1234"}},
            {"customer_id": 2, "name": null, "contact_info": ["a", "b"]}
        ]);
        let batch = RecordBatch::from_json(&json, &schema()).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.records()[0].get("contact_info"),
            Some(&Value::String(
                r#"{"email":"alice@example.com","phone":"555-1234"}"#.into()
            ))
        );
        assert_eq!(batch.records()[1].get("name"), Some(&Value::Null));
        batch.validate(&schema()).unwrap();
    }

    #[test]
    fn json_errors_carry_record_index() {
        let json = json!([{"customer_id": 1}, {"customer_id": 3_000_000_000_i64}]);
        let err = RecordBatch::from_json(&json, &schema()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: Some(1), .. }));

        let err = RecordBatch::from_json(&json!({"customer_id": 1}), &schema()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: None, .. }));

        let err = RecordBatch::from_json(&json!([{"zip": "x"}]), &schema()).unwrap_err();
        assert!(err.to_string().contains("unexpected column 'zip'"));
    }

    #[test]
    fn option_values_convert_to_null() {
        let record: Record = [("name", Value::from(None::<&str>))].into_iter().collect();
        assert_eq!(record.get("name"), Some(&Value::Null));
    }
}
