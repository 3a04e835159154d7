//! Encoding record batches into data files.
//!
//! [`ParquetEncoder`] writes one Parquet file per batch with a single row
//! group. Arrow fields carry the Iceberg field id in their `PARQUET:field_id`
//! metadata so readers can resolve columns by id rather than by name.
//!
//! A nullable column of a type floe cannot write is left out of the file when
//! no record sets it. Iceberg readers return nulls for columns a data file
//! does not contain.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{
    Array as _, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::record::{Record, RecordBatch, Value};
use crate::schema::{FieldSpec, LogicalType, SchemaSpec};

const FIELD_ID_KEY: &str = "PARQUET:field_id";

/// Data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileFormat {
    /// Apache Parquet.
    Parquet,
}

impl DataFileFormat {
    /// Returns the file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
        }
    }

    /// Returns the Iceberg file format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parquet => "PARQUET",
        }
    }

    /// Parses an Iceberg file format name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        name.eq_ignore_ascii_case("parquet").then_some(Self::Parquet)
    }
}

impl fmt::Display for DataFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded batch ready to be staged and committed.
///
/// The batch id is fixed at encode time, so every commit attempt for the same
/// batch refers to the same data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    batch_id: Uuid,
    format: DataFileFormat,
    data: Bytes,
    record_count: u64,
}

impl EncodedBatch {
    /// Creates an encoded batch with a fresh id.
    #[must_use]
    pub fn new(format: DataFileFormat, data: Bytes, record_count: u64) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            format,
            data,
            record_count,
        }
    }

    /// Returns the batch id.
    #[must_use]
    pub const fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Returns the file format.
    #[must_use]
    pub const fn format(&self) -> DataFileFormat {
        self.format
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the number of encoded records.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Returns the file name for this batch: `{batch_id}.{ext}`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.batch_id, self.format.extension())
    }
}

/// Turns a validated batch into a data file.
pub trait RecordEncoder: Send + Sync {
    /// Encodes `batch` using `schema` for column order and types.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Encoding`] if the batch cannot be encoded.
    fn encode(&self, batch: &RecordBatch, schema: &SchemaSpec) -> Result<EncodedBatch>;
}

/// Writes batches as Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetEncoder {
    created_by: String,
}

impl Default for ParquetEncoder {
    fn default() -> Self {
        Self {
            created_by: concat!("floe-catalog ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ParquetEncoder {
    /// Creates an encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn writer_properties(&self) -> WriterProperties {
        let created_by = KeyValue {
            key: "created_by".to_string(),
            value: Some(self.created_by.clone()),
        };
        WriterProperties::builder()
            .set_key_value_metadata(Some(vec![created_by]))
            .build()
    }

    /// Reads a Parquet file produced by this encoder back into records.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Encoding`] if the file cannot be read or a
    /// column has an unexpected type.
    pub fn decode(data: &Bytes, schema: &SchemaSpec) -> Result<RecordBatch> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(data.clone())
            .map_err(|e| encoding("parquet reader init failed", e))?
            .build()
            .map_err(|e| encoding("parquet reader build failed", e))?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| encoding("parquet read batch failed", e))?;
            let mut rows = vec![Record::new(); batch.num_rows()];
            for field in schema.fields() {
                let Ok(idx) = batch.schema().index_of(&field.name) else {
                    continue;
                };
                let column = batch.column(idx);
                for (row, record) in rows.iter_mut().enumerate() {
                    record.insert(field.name.clone(), read_cell(column, row, field)?);
                }
            }
            records.extend(rows);
        }
        Ok(RecordBatch::new(records))
    }
}

impl RecordEncoder for ParquetEncoder {
    fn encode(&self, batch: &RecordBatch, schema: &SchemaSpec) -> Result<EncodedBatch> {
        let fields = written_fields(schema, batch.records())?;
        let arrow_schema = Arc::new(arrow_schema(&fields)?);
        let columns = fields
            .iter()
            .map(|field| build_column(field, batch.records()))
            .collect::<Result<Vec<_>>>()?;

        let arrow_batch = arrow::record_batch::RecordBatch::try_new(arrow_schema.clone(), columns)
            .map_err(|e| encoding("record batch build failed", e))?;

        let mut cursor = Cursor::new(Vec::<u8>::new());
        let mut writer =
            ArrowWriter::try_new(&mut cursor, arrow_schema, Some(self.writer_properties()))
                .map_err(|e| encoding("parquet writer init failed", e))?;
        writer
            .write(&arrow_batch)
            .map_err(|e| encoding("parquet write failed", e))?;
        writer
            .close()
            .map_err(|e| encoding("parquet close failed", e))?;

        Ok(EncodedBatch::new(
            DataFileFormat::Parquet,
            Bytes::from(cursor.into_inner()),
            batch.len() as u64,
        ))
    }
}

fn encoding(context: &str, err: impl std::error::Error + Send + Sync + 'static) -> CatalogError {
    CatalogError::Encoding {
        message: format!("{context}: {err}"),
        source: Some(Box::new(err)),
    }
}

fn written_fields<'a>(schema: &'a SchemaSpec, records: &[Record]) -> Result<Vec<&'a FieldSpec>> {
    schema
        .fields()
        .iter()
        .filter_map(|field| {
            if field.logical_type.is_writable() {
                return Some(Ok(field));
            }
            let unset = records
                .iter()
                .all(|r| matches!(r.get(&field.name), None | Some(Value::Null)));
            if field.nullable && unset {
                None
            } else {
                Some(Err(unsupported(field)))
            }
        })
        .collect()
}

fn unsupported(field: &FieldSpec) -> CatalogError {
    CatalogError::Encoding {
        message: format!(
            "column '{}' has unsupported type {}",
            field.name,
            field.logical_type.iceberg_name()
        ),
        source: None,
    }
}

fn arrow_schema(fields: &[&FieldSpec]) -> Result<Schema> {
    let fields = fields
        .iter()
        .map(|f| {
            let field = Field::new(&f.name, data_type(f)?, f.nullable);
            Ok(match f.field_id {
                Some(id) => field.with_metadata(HashMap::from([(
                    FIELD_ID_KEY.to_string(),
                    id.to_string(),
                )])),
                None => field,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

fn data_type(field: &FieldSpec) -> Result<DataType> {
    Ok(match &field.logical_type {
        LogicalType::Boolean => DataType::Boolean,
        LogicalType::Int32 => DataType::Int32,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::Float32 => DataType::Float32,
        LogicalType::Float64 => DataType::Float64,
        LogicalType::String => DataType::Utf8,
        LogicalType::Unsupported(_) => return Err(unsupported(field)),
    })
}

fn build_column(field: &FieldSpec, records: &[Record]) -> Result<ArrayRef> {
    macro_rules! collect {
        ($variant:ident) => {
            records
                .iter()
                .enumerate()
                .map(|(i, r)| match r.get(&field.name) {
                    None | Some(Value::Null) => Ok(None),
                    Some(Value::$variant(v)) => Ok(Some(v.clone())),
                    Some(other) => Err(wrong_type(field, i, other)),
                })
                .collect::<Result<Vec<_>>>()?
        };
    }

    Ok(match &field.logical_type {
        LogicalType::Boolean => Arc::new(BooleanArray::from(collect!(Boolean))),
        LogicalType::Int32 => Arc::new(Int32Array::from(collect!(Int32))),
        LogicalType::Int64 => Arc::new(Int64Array::from(collect!(Int64))),
        LogicalType::Float32 => Arc::new(Float32Array::from(collect!(Float32))),
        LogicalType::Float64 => Arc::new(Float64Array::from(collect!(Float64))),
        LogicalType::String => Arc::new(StringArray::from(collect!(String))),
        LogicalType::Unsupported(_) => return Err(unsupported(field)),
    })
}

fn wrong_type(field: &FieldSpec, index: usize, value: &Value) -> CatalogError {
    CatalogError::Encoding {
        message: format!(
            "record {index}: column '{}' expects {}, got {value}",
            field.name, field.logical_type
        ),
        source: None,
    }
}

fn read_cell(column: &ArrayRef, row: usize, field: &FieldSpec) -> Result<Value> {
    if column.is_null(row) {
        return Ok(Value::Null);
    }
    let any = column.as_any();
    let value = match &field.logical_type {
        LogicalType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| Value::Boolean(a.value(row))),
        LogicalType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| Value::Int32(a.value(row))),
        LogicalType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| Value::Int64(a.value(row))),
        LogicalType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| Value::Float32(a.value(row))),
        LogicalType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| Value::Float64(a.value(row))),
        LogicalType::String => any
            .downcast_ref::<StringArray>()
            .map(|a| Value::String(a.value(row).to_string())),
        LogicalType::Unsupported(_) => None,
    };
    value.ok_or_else(|| CatalogError::Encoding {
        message: format!("column '{}' is not {}", field.name, field.logical_type),
        source: None,
    })
}
