//! Iceberg v2 manifests and manifest lists.
//!
//! An append writes one manifest listing its data file, then a manifest list
//! that carries every manifest of the parent snapshot forward and adds the
//! new one. Manifest entries leave `snapshot_id` and the sequence numbers
//! null so they inherit them from the manifest list entry that adds them.
//!
//! Only unpartitioned data manifests are written. Manifest lists written by
//! other engines are read through floe's schema, which drops fields floe
//! does not know.

use std::collections::HashMap;

use apache_avro::types::Value;
use apache_avro::{Reader, Schema as AvroSchema, Writer};
use bytes::Bytes;

use crate::encoder::DataFileFormat;

const MANIFEST_ENTRY_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_entry",
  "fields": [
    {"name": "status", "type": "int", "field-id": 0},
    {"name": "snapshot_id", "type": ["null", "long"], "default": null, "field-id": 1},
    {"name": "sequence_number", "type": ["null", "long"], "default": null, "field-id": 3},
    {"name": "file_sequence_number", "type": ["null", "long"], "default": null, "field-id": 4},
    {"name": "data_file", "field-id": 2, "type": {
      "type": "record",
      "name": "r2",
      "fields": [
        {"name": "content", "type": "int", "field-id": 134},
        {"name": "file_path", "type": "string", "field-id": 100},
        {"name": "file_format", "type": "string", "field-id": 101},
        {"name": "partition", "field-id": 102, "type": {"type": "record", "name": "r102", "fields": []}},
        {"name": "record_count", "type": "long", "field-id": 103},
        {"name": "file_size_in_bytes", "type": "long", "field-id": 104}
      ]
    }}
  ]
}"#;

const MANIFEST_FILE_SCHEMA: &str = r#"{
  "type": "record",
  "name": "manifest_file",
  "fields": [
    {"name": "manifest_path", "type": "string", "field-id": 500},
    {"name": "manifest_length", "type": "long", "field-id": 501},
    {"name": "partition_spec_id", "type": "int", "field-id": 502},
    {"name": "content", "type": "int", "default": 0, "field-id": 517},
    {"name": "sequence_number", "type": "long", "default": 0, "field-id": 515},
    {"name": "min_sequence_number", "type": "long", "default": 0, "field-id": 516},
    {"name": "added_snapshot_id", "type": "long", "field-id": 503},
    {"name": "added_files_count", "type": "int", "field-id": 504},
    {"name": "existing_files_count", "type": "int", "field-id": 505},
    {"name": "deleted_files_count", "type": "int", "field-id": 506},
    {"name": "added_rows_count", "type": "long", "field-id": 512},
    {"name": "existing_rows_count", "type": "long", "field-id": 513},
    {"name": "deleted_rows_count", "type": "long", "field-id": 514},
    {"name": "partitions", "default": null, "field-id": 507, "type": ["null", {
      "type": "array",
      "element-id": 508,
      "items": {
        "type": "record",
        "name": "r508",
        "fields": [
          {"name": "contains_null", "type": "boolean", "field-id": 509},
          {"name": "contains_nan", "type": ["null", "boolean"], "default": null, "field-id": 518},
          {"name": "lower_bound", "type": ["null", "bytes"], "default": null, "field-id": 510},
          {"name": "upper_bound", "type": ["null", "bytes"], "default": null, "field-id": 511}
        ]
      }
    }]},
    {"name": "key_metadata", "type": ["null", "bytes"], "default": null, "field-id": 519}
  ]
}"#;

/// Manifest entry status for a file added by the manifest's snapshot.
const STATUS_ADDED: i32 = 1;

/// Content type of data files and data manifests.
const CONTENT_DATA: i32 = 0;

/// Failures reading or writing manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Avro encoding or decoding failed.
    #[error("avro: {0}")]
    Avro(#[from] apache_avro::Error),

    /// A record is missing a field or has one of the wrong type.
    #[error("malformed {record}: field '{field}' is missing or mistyped")]
    Malformed {
        /// Record kind, `manifest_file` or `manifest_entry`.
        record: &'static str,
        /// Field name.
        field: &'static str,
    },
}

type Result<T> = std::result::Result<T, ManifestError>;

/// A data file listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    /// Full path of the file.
    pub path: String,
    /// File format.
    pub format: DataFileFormat,
    /// Rows in the file.
    pub record_count: u64,
    /// File size.
    pub file_size_in_bytes: u64,
}

/// A manifest listed in a manifest list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    /// Full path of the manifest.
    pub path: String,
    /// Manifest size.
    pub length: u64,
    /// Snapshot that added the manifest.
    pub added_snapshot_id: i64,
    /// Sequence number of the snapshot that added the manifest.
    pub sequence_number: i64,
    /// Data files added by that snapshot.
    pub added_files_count: u32,
    /// Rows in the added data files.
    pub added_rows_count: u64,
}

/// Writes a manifest of freshly added data files.
///
/// `schema_json` is the table schema as Iceberg JSON; it is stored in the
/// file header next to the partition spec.
///
/// # Errors
///
/// Returns [`ManifestError::Avro`] if encoding fails.
pub fn write_manifest(schema_json: &str, schema_id: i32, files: &[DataFile]) -> Result<Bytes> {
    let schema = AvroSchema::parse_str(MANIFEST_ENTRY_SCHEMA)?;
    let mut writer = Writer::new(&schema, Vec::new());
    let metadata = [
        ("schema", schema_json.to_string()),
        ("schema-id", schema_id.to_string()),
        ("partition-spec", "[]".to_string()),
        ("partition-spec-id", "0".to_string()),
        ("format-version", "2".to_string()),
        ("content", "data".to_string()),
    ];
    for (key, value) in metadata {
        writer.add_user_metadata(key.to_string(), value)?;
    }

    for file in files {
        let data_file = Value::Record(vec![
            ("content".into(), Value::Int(CONTENT_DATA)),
            ("file_path".into(), Value::String(file.path.clone())),
            ("file_format".into(), Value::String(file.format.as_str().into())),
            ("partition".into(), Value::Record(Vec::new())),
            ("record_count".into(), Value::Long(to_long(file.record_count))),
            (
                "file_size_in_bytes".into(),
                Value::Long(to_long(file.file_size_in_bytes)),
            ),
        ]);
        writer.append(Value::Record(vec![
            ("status".into(), Value::Int(STATUS_ADDED)),
            ("snapshot_id".into(), null()),
            ("sequence_number".into(), null()),
            ("file_sequence_number".into(), null()),
            ("data_file".into(), data_file),
        ]))?;
    }
    Ok(Bytes::from(writer.into_inner()?))
}

/// The snapshot a manifest list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    /// Snapshot id.
    pub snapshot_id: i64,
    /// Parent snapshot id.
    pub parent_snapshot_id: Option<i64>,
    /// Snapshot sequence number.
    pub sequence_number: i64,
}

/// Writes a manifest list holding the parent's manifests followed by `added`.
///
/// `parent` is the raw parent manifest list, if the table has a snapshot.
///
/// # Errors
///
/// Returns [`ManifestError::Avro`] if the parent cannot be read or the new
/// list cannot be encoded.
pub fn write_manifest_list(
    header: ListHeader,
    parent: Option<&[u8]>,
    added: &ManifestFile,
) -> Result<Bytes> {
    let schema = AvroSchema::parse_str(MANIFEST_FILE_SCHEMA)?;
    let carried = match parent {
        Some(bytes) => Reader::with_schema(&schema, bytes)?.collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let mut writer = Writer::new(&schema, Vec::new());
    let parent_id = header
        .parent_snapshot_id
        .map_or_else(|| "null".to_string(), |id| id.to_string());
    writer.add_user_metadata("snapshot-id".to_string(), header.snapshot_id.to_string())?;
    writer.add_user_metadata("parent-snapshot-id".to_string(), parent_id)?;
    writer.add_user_metadata("sequence-number".to_string(), header.sequence_number.to_string())?;
    writer.add_user_metadata("format-version".to_string(), "2")?;

    for value in carried {
        writer.append(value)?;
    }
    writer.append(Value::Record(vec![
        ("manifest_path".into(), Value::String(added.path.clone())),
        ("manifest_length".into(), Value::Long(to_long(added.length))),
        ("partition_spec_id".into(), Value::Int(0)),
        ("content".into(), Value::Int(CONTENT_DATA)),
        ("sequence_number".into(), Value::Long(added.sequence_number)),
        ("min_sequence_number".into(), Value::Long(added.sequence_number)),
        ("added_snapshot_id".into(), Value::Long(added.added_snapshot_id)),
        (
            "added_files_count".into(),
            Value::Int(i32::try_from(added.added_files_count).unwrap_or(i32::MAX)),
        ),
        ("existing_files_count".into(), Value::Int(0)),
        ("deleted_files_count".into(), Value::Int(0)),
        ("added_rows_count".into(), Value::Long(to_long(added.added_rows_count))),
        ("existing_rows_count".into(), Value::Long(0)),
        ("deleted_rows_count".into(), Value::Long(0)),
        ("partitions".into(), Value::Union(1, Box::new(Value::Array(Vec::new())))),
        ("key_metadata".into(), null()),
    ]))?;
    Ok(Bytes::from(writer.into_inner()?))
}

/// Reads the manifests in a manifest list.
///
/// # Errors
///
/// Returns an error if the bytes are not a manifest list.
pub fn read_manifest_list(bytes: &[u8]) -> Result<Vec<ManifestFile>> {
    let schema = AvroSchema::parse_str(MANIFEST_FILE_SCHEMA)?;
    Reader::with_schema(&schema, bytes)?
        .map(|value| {
            let fields = record(value?, "manifest_file")?;
            let get = |name: &'static str| Field::new("manifest_file", &fields, name);
            Ok(ManifestFile {
                path: get("manifest_path").string()?,
                length: get("manifest_length").unsigned()?,
                added_snapshot_id: get("added_snapshot_id").long()?,
                sequence_number: get("sequence_number").long()?,
                added_files_count: u32::try_from(get("added_files_count").long()?).unwrap_or(0),
                added_rows_count: get("added_rows_count").unsigned()?,
            })
        })
        .collect()
}

/// Reads the data files in a manifest.
///
/// # Errors
///
/// Returns an error if the bytes are not a data manifest.
pub fn read_manifest(bytes: &[u8]) -> Result<Vec<DataFile>> {
    Reader::new(bytes)?
        .map(|value| {
            let entry = record(value?, "manifest_entry")?;
            let data_file = Field::new("manifest_entry", &entry, "data_file").value()?;
            let fields = record(data_file.clone(), "manifest_entry")?;
            let get = |name: &'static str| Field::new("manifest_entry", &fields, name);
            let format = get("file_format").string()?;
            Ok(DataFile {
                path: get("file_path").string()?,
                format: DataFileFormat::parse(&format).ok_or(ManifestError::Malformed {
                    record: "manifest_entry",
                    field: "file_format",
                })?,
                record_count: get("record_count").unsigned()?,
                file_size_in_bytes: get("file_size_in_bytes").unsigned()?,
            })
        })
        .collect()
}

/// Reads the key-value metadata from an Avro file header.
///
/// # Errors
///
/// Returns [`ManifestError::Avro`] if the bytes are not an Avro file.
pub fn read_header(bytes: &[u8]) -> Result<HashMap<String, String>> {
    let reader = Reader::new(bytes)?;
    Ok(reader
        .user_metadata()
        .iter()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
        .collect())
}

fn null() -> Value {
    Value::Union(0, Box::new(Value::Null))
}

fn to_long(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn record(value: Value, kind: &'static str) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Record(fields) => Ok(fields),
        _ => Err(ManifestError::Malformed {
            record: kind,
            field: "<record>",
        }),
    }
}

struct Field<'a> {
    record: &'static str,
    name: &'static str,
    value: Option<&'a Value>,
}

impl<'a> Field<'a> {
    fn new(record: &'static str, fields: &'a [(String, Value)], name: &'static str) -> Self {
        let value = fields.iter().find(|(n, _)| n == name).map(|(_, v)| match v {
            Value::Union(_, inner) => inner.as_ref(),
            other => other,
        });
        Self { record, name, value }
    }

    fn malformed(&self) -> ManifestError {
        ManifestError::Malformed {
            record: self.record,
            field: self.name,
        }
    }

    fn value(&self) -> Result<&'a Value> {
        self.value.ok_or_else(|| self.malformed())
    }

    fn string(&self) -> Result<String> {
        match self.value {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(self.malformed()),
        }
    }

    fn long(&self) -> Result<i64> {
        match self.value {
            Some(Value::Long(n)) => Ok(*n),
            Some(Value::Int(n)) => Ok(i64::from(*n)),
            _ => Err(self.malformed()),
        }
    }

    fn unsigned(&self) -> Result<u64> {
        u64::try_from(self.long()?).map_err(|_| self.malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{"type":"struct","schema-id":0,"fields":[{"id":1,"name":"id","required":false,"type":"long"}]}"#;

    fn data_file(name: &str, rows: u64) -> DataFile {
        DataFile {
            path: format!("s3://bucket/t/data/{name}.parquet"),
            format: DataFileFormat::Parquet,
            record_count: rows,
            file_size_in_bytes: 512,
        }
    }

    fn added(path: &str, snapshot_id: i64, sequence_number: i64) -> ManifestFile {
        ManifestFile {
            path: path.to_string(),
            length: 1024,
            added_snapshot_id: snapshot_id,
            sequence_number,
            added_files_count: 1,
            added_rows_count: 2,
        }
    }

    #[test]
    fn manifest_lists_its_data_files() {
        let bytes = write_manifest(SCHEMA, 0, &[data_file("a", 2)]).unwrap();
        assert!(bytes.starts_with(b"Obj\x01"));
        assert_eq!(read_manifest(&bytes).unwrap(), vec![data_file("a", 2)]);

        let header = read_header(&bytes).unwrap();
        assert_eq!(header["format-version"], "2");
        assert_eq!(header["content"], "data");
        assert_eq!(header["partition-spec"], "[]");
        assert_eq!(header["schema"], SCHEMA);
    }

    #[test]
    fn manifest_list_carries_parent_manifests_forward() {
        let first = write_manifest_list(
            ListHeader {
                snapshot_id: 10,
                parent_snapshot_id: None,
                sequence_number: 1,
            },
            None,
            &added("s3://bucket/t/metadata/a-m0.avro", 10, 1),
        )
        .unwrap();
        let second = write_manifest_list(
            ListHeader {
                snapshot_id: 20,
                parent_snapshot_id: Some(10),
                sequence_number: 2,
            },
            Some(&first),
            &added("s3://bucket/t/metadata/b-m0.avro", 20, 2),
        )
        .unwrap();

        let manifests = read_manifest_list(&second).unwrap();
        assert_eq!(
            manifests,
            vec![
                added("s3://bucket/t/metadata/a-m0.avro", 10, 1),
                added("s3://bucket/t/metadata/b-m0.avro", 20, 2),
            ]
        );
        let header = read_header(&second).unwrap();
        assert_eq!(header["snapshot-id"], "20");
        assert_eq!(header["parent-snapshot-id"], "10");
        assert_eq!(header["sequence-number"], "2");
    }

    #[test]
    fn garbage_is_not_a_manifest_list() {
        assert!(matches!(
            read_manifest_list(b"not avro"),
            Err(ManifestError::Avro(_))
        ));
    }
}
