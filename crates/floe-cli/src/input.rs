//! Record input for `floe append`.
//!
//! Records are JSON objects keyed by column name, given either as one JSON
//! array or as JSON lines. Objects and arrays supplied for a `string` column
//! are stored as compact JSON text.

use floe_catalog::error::CatalogError;
use floe_catalog::record::{Record, RecordBatch};
use floe_catalog::schema::SchemaSpec;

/// Parses records from `text`, typing values by `schema`.
///
/// # Errors
///
/// Returns [`CatalogError::Validation`] naming the first record that is not
/// valid JSON or does not fit the schema.
pub fn parse_records(text: &str, schema: &SchemaSpec) -> Result<RecordBatch, CatalogError> {
    let trimmed = text.trim();
    let values: Vec<serde_json::Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| CatalogError::Validation {
            message: format!("records are not a valid JSON array: {e}"),
            record: None,
        })?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .map_err(|e| CatalogError::invalid_record(index, format!("invalid JSON: {e}")))
            })
            .collect::<Result<_, _>>()?
    };

    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            Record::from_json(value, schema).map_err(|e| CatalogError::invalid_record(index, e))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(RecordBatch::new)
}

#[cfg(test)]
mod tests {
    use floe_catalog::record::Value;

    use super::*;
    use crate::DEFAULT_SCHEMA;

    fn schema() -> SchemaSpec {
        DEFAULT_SCHEMA.parse().unwrap()
    }

    #[test]
    fn test_nested_contact_info_is_stringified() {
        let batch = parse_records(
            r#"[
                {"customer_id": 1, "name": "Alice",
                 "contact_info": {"email": "alice@example.com", "phone": "555-0100"}},
                {"customer_id": 2, "name": "Bob", "contact_info": "{}"}
            ]"#,
            &schema(),
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.records()[0].get("contact_info"),
            Some(&Value::String(
                r#"{"email":"alice@example.com","phone":"555-0100"}"#.into()
            ))
        );
        assert_eq!(batch.records()[1].get("customer_id"), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_json_lines() {
        let text = "{\"customer_id\": 1, \"name\": \"A\", \"contact_info\": \"x\"}\n\n\
                    {\"customer_id\": 2, \"name\": \"B\", \"contact_info\": \"y\"}\n";
        let batch = parse_records(text, &schema()).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_bad_record_is_named() {
        let err = parse_records(
            r#"[{"customer_id": 1}, {"customer_id": "two"}]"#,
            &schema(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: Some(1), .. }));

        let err = parse_records("{\"customer_id\": 1}\nnot json", &schema()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { record: Some(1), .. }));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = parse_records(r#"[{"loyalty_tier": "gold"}]"#, &schema()).unwrap_err();
        assert!(err.to_string().contains("loyalty_tier"));
    }
}
