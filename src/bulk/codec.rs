//! Encoding of batch bodies and decoding of batch results.
//!
//! JSON bodies are an array of flat objects. CSV bodies use the union of all
//! field names (first-seen order) as header, dotted columns for relationship
//! fields, and `#N/A` for nulls.

use serde_json::{Map, Value};

use crate::bulk::records::{json_kind, Record, RecordList};
use crate::bulk::results::RecordResult;
use crate::error::AppError;
use crate::salesforce::{BatchResultRow, ContentType};

/// Value Salesforce reads as "set this field to null" in CSV bodies.
const CSV_NULL: &str = "#N/A";

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Serializes a record container into a batch request body.
pub fn encode_records<R: Record>(
    records: &RecordList<R>,
    content_type: ContentType,
) -> Result<Vec<u8>, AppError> {
    let rows = records.to_field_maps()?;
    match content_type {
        ContentType::Json => serde_json::to_vec(&rows)
            .map_err(|e| AppError::Internal(format!("Failed to encode JSON batch: {}", e))),
        ContentType::Csv => encode_csv(&rows),
    }
}

fn encode_csv(rows: &[Map<String, Value>]) -> Result<Vec<u8>, AppError> {
    let mut flat_rows: Vec<Vec<(String, String)>> = Vec::with_capacity(rows.len());
    let mut header: Vec<String> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let mut flat = Vec::with_capacity(row.len());
        flatten_into("", row, &mut flat)
            .map_err(|msg| AppError::InvalidRecord(format!("record {}: {}", i, msg)))?;
        for (column, _) in &flat {
            if !header.contains(column) {
                header.push(column.clone());
            }
        }
        flat_rows.push(flat);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;

    for flat in &flat_rows {
        let line = header.iter().map(|column| {
            flat.iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        });
        writer
            .write_record(line)
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV batch: {}", e)))
}

/// Flattens nested objects into `Parent.Child` columns.
fn flatten_into(
    prefix: &str,
    fields: &Map<String, Value>,
    out: &mut Vec<(String, String)>,
) -> Result<(), String> {
    for (name, value) in fields {
        let column = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match value {
            Value::Object(nested) => flatten_into(&column, nested, out)?,
            Value::Array(_) => {
                return Err(format!(
                    "field '{}' is an {}, which CSV cannot carry",
                    column,
                    json_kind(value)
                ))
            }
            Value::Null => out.push((column, CSV_NULL.to_string())),
            Value::String(s) => out.push((column, s.clone())),
            Value::Bool(b) => out.push((column, b.to_string())),
            Value::Number(n) => out.push((column, n.to_string())),
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a batch result body into per-record outcomes, in body order.
pub fn decode_results(body: &[u8], content_type: ContentType) -> Result<Vec<RecordResult>, AppError> {
    match content_type {
        ContentType::Json => {
            let rows: Vec<BatchResultRow> = serde_json::from_slice(body).map_err(|e| {
                AppError::Internal(format!("Failed to parse batch result: {}", e))
            })?;
            Ok(rows.into_iter().map(RecordResult::from).collect())
        }
        ContentType::Csv => decode_csv_results(body),
    }
}

fn decode_csv_results(body: &[u8]) -> Result<Vec<RecordResult>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Internal(format!("Failed to read result header: {}", e)))?
        .clone();

    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(id_col), Some(success_col), Some(created_col)) =
        (position("Id"), position("Success"), position("Created"))
    else {
        return Err(AppError::Internal(
            "Batch result is missing Id/Success/Created columns".to_string(),
        ));
    };
    let error_col = position("Error");

    let mut results = Vec::new();
    for row in reader.records() {
        let row =
            row.map_err(|e| AppError::Internal(format!("Failed to read result row: {}", e)))?;
        let field = |col: usize| row.get(col).unwrap_or("").trim();

        let id = Some(field(id_col)).filter(|s| !s.is_empty()).map(str::to_string);
        let error = error_col
            .map(|col| field(col))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        results.push(RecordResult::new(
            id,
            parse_flag(field(created_col)),
            parse_flag(field(success_col)),
            error,
        ));
    }
    Ok(results)
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::records::SObject;
    use serde_json::json;

    #[test]
    fn json_body_is_array_of_objects_in_order() {
        let list: RecordList<SObject> = vec![
            SObject::new().with("Name", "A"),
            SObject::new().with("Name", "B"),
        ]
        .into();

        let body = encode_records(&list, ContentType::Json).unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(parsed, json!([{ "Name": "A" }, { "Name": "B" }]));
    }

    #[test]
    fn csv_body_unions_columns_and_flattens_relationships() {
        let list: RecordList<SObject> = vec![
            SObject::new().with("Name", "Acme, Inc.").with("Phone", Value::Null),
            SObject::new()
                .with("Name", "Beta")
                .with("Owner", json!({ "Email": "a@b.c" })),
        ]
        .into();

        let body = encode_records(&list, ContentType::Csv).unwrap();
        let text = String::from_utf8(body).unwrap();

        assert_eq!(
            text,
            "Name,Phone,Owner.Email\n\"Acme, Inc.\",#N/A,\nBeta,,a@b.c\n"
        );
    }

    #[test]
    fn csv_body_rejects_array_fields() {
        let list: RecordList<SObject> = vec![SObject::new().with("Tags", json!(["a"]))].into();

        match encode_records(&list, ContentType::Csv) {
            Err(AppError::InvalidRecord(msg)) => assert!(msg.contains("Tags")),
            other => panic!("Expected InvalidRecord, got: {:?}", other),
        }
    }

    #[test]
    fn json_results_collapse_errors_into_message() {
        let body = json!([
            { "id": "001xx1", "success": true, "created": true, "errors": [] },
            {
                "id": null,
                "success": false,
                "created": false,
                "errors": [
                    { "statusCode": "REQUIRED_FIELD_MISSING", "message": "Required fields are missing: [Name]", "fields": ["Name"] }
                ]
            }
        ]);

        let results = decode_results(&serde_json::to_vec(&body).unwrap(), ContentType::Json).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id.as_deref(), Some("001xx1"));
        assert!(results[0].created && results[0].success);
        assert!(results[0].error_message.is_none());
        assert!(!results[1].success);
        assert_eq!(
            results[1].error_message.as_deref(),
            Some("REQUIRED_FIELD_MISSING: Required fields are missing: [Name]")
        );
    }

    #[test]
    fn csv_results_are_parsed_positionally() {
        let body = "\"Id\",\"Success\",\"Created\",\"Error\"\n\
                    \"001xx1\",\"true\",\"true\",\"\"\n\
                    \"\",\"false\",\"false\",\"INVALID_FIELD:bad value\"\n";

        let results = decode_results(body.as_bytes(), ContentType::Csv).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id.as_deref(), Some("001xx1"));
        assert!(results[0].success && results[0].created);
        assert_eq!(results[1].id, None);
        assert_eq!(
            results[1].error_message.as_deref(),
            Some("INVALID_FIELD:bad value")
        );
    }

    #[test]
    fn csv_results_without_required_columns_fail() {
        let body = "Foo,Bar\n1,2\n";
        assert!(decode_results(body.as_bytes(), ContentType::Csv).is_err());
    }
}
