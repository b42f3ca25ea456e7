//! Record containers: the unit of work submitted as one batch.
//!
//! A record is anything that can present itself as an ordered field-name to
//! value mapping. `SObject` is the schema-free form; any `Serialize` struct
//! whose fields mirror the object's is the schema-known form. Both go through
//! the same encoder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Salesforce accepts at most this many records in one batch.
pub const MAX_RECORDS_PER_BATCH: usize = 10_000;

// ─────────────────────────────────────────────────────────────────────────────
// Record capability
// ─────────────────────────────────────────────────────────────────────────────

/// Fieldwise key/value access to one record.
pub trait Record {
    /// Returns the record's fields in declaration / insertion order.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidRecord` if the value is not shaped like an object.
    fn to_fields(&self) -> Result<Map<String, Value>, AppError>;
}

impl<T: Serialize> Record for T {
    fn to_fields(&self) -> Result<Map<String, Value>, AppError> {
        let value = serde_json::to_value(self)
            .map_err(|e| AppError::InvalidRecord(format!("Failed to serialize record: {}", e)))?;

        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(AppError::InvalidRecord(format!(
                "Record must serialize to an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SObject
// ─────────────────────────────────────────────────────────────────────────────

/// A schema-free record: field name to value, in insertion order.
///
/// ```
/// use stampede_bulk::SObject;
///
/// let account = SObject::new().with("Name", "Acme").with("NumberOfEmployees", 42);
/// assert_eq!(account.get("Name").and_then(|v| v.as_str()), Some("Acme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SObject(Map<String, Value>);

impl SObject {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The record's `Id` field, if set to a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get("Id").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for SObject {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordList
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered records submitted together as one batch.
///
/// Result alignment is positional: the n-th result of a batch belongs to the
/// n-th record of the list it was submitted from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordList<R> {
    records: Vec<R>,
}

impl<R> RecordList<R> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.records
    }

    pub fn into_inner(self) -> Vec<R> {
        self.records
    }

    /// Splits the list into consecutive lists of at most `max` records,
    /// preserving order. An empty list yields no batches.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidRequest` if `max` is 0 or above the per-batch limit.
    pub fn into_batches(self, max: usize) -> Result<Vec<RecordList<R>>, AppError> {
        if max == 0 || max > MAX_RECORDS_PER_BATCH {
            return Err(AppError::InvalidRequest(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_RECORDS_PER_BATCH, max
            )));
        }

        let mut batches = Vec::with_capacity(self.records.len().div_ceil(max));
        let mut current = Vec::with_capacity(max.min(self.records.len()));
        for record in self.records {
            current.push(record);
            if current.len() == max {
                batches.push(RecordList::from(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            batches.push(RecordList::from(current));
        }
        Ok(batches)
    }
}

impl<R: Record> RecordList<R> {
    /// Collects each record's fields, failing on the first malformed record.
    pub(crate) fn to_field_maps(&self) -> Result<Vec<Map<String, Value>>, AppError> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                record.to_fields().map_err(|e| match e {
                    AppError::InvalidRecord(msg) => {
                        AppError::InvalidRecord(format!("record {}: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

impl<R> Default for RecordList<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> From<Vec<R>> for RecordList<R> {
    fn from(records: Vec<R>) -> Self {
        Self { records }
    }
}

impl<R> FromIterator<R> for RecordList<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<R> Extend<R> for RecordList<R> {
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl<R> IntoIterator for RecordList<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a RecordList<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Splits `records` into batch-sized containers of at most `max` records.
pub fn split_into_batches<R>(records: Vec<R>, max: usize) -> Result<Vec<RecordList<R>>, AppError> {
    RecordList::from(records).into_batches(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Account {
        name: String,
        number_of_employees: Option<u32>,
    }

    #[test]
    fn typed_record_exposes_fields_in_declaration_order() {
        let account = Account {
            name: "Acme".to_string(),
            number_of_employees: None,
        };

        let fields = account.to_fields().unwrap();
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();

        assert_eq!(keys, vec!["Name", "NumberOfEmployees"]);
        assert_eq!(fields["NumberOfEmployees"], Value::Null);
    }

    #[test]
    fn sobject_and_typed_record_encode_identically() {
        let typed = Account {
            name: "Acme".to_string(),
            number_of_employees: Some(5),
        };
        let generic = SObject::new()
            .with("Name", "Acme")
            .with("NumberOfEmployees", 5);

        assert_eq!(typed.to_fields().unwrap(), generic.to_fields().unwrap());
    }

    #[test]
    fn non_object_record_is_rejected() {
        let list: RecordList<&str> = vec!["just a string"].into();

        match list.to_field_maps() {
            Err(AppError::InvalidRecord(msg)) => {
                assert!(msg.contains("record 0"), "got: {}", msg);
                assert!(msg.contains("string"), "got: {}", msg);
            }
            other => panic!("Expected InvalidRecord, got: {:?}", other),
        }
    }

    #[test]
    fn sobject_id_reads_string_id_only() {
        assert_eq!(SObject::new().with("Id", "001xx1").id(), Some("001xx1"));
        assert_eq!(SObject::new().with("Id", 7).id(), None);
        assert_eq!(SObject::new().id(), None);
    }

    #[test]
    fn into_batches_preserves_order_and_bounds() {
        let records: Vec<SObject> = (0..7)
            .map(|i| SObject::new().with("Name", format!("Acct{}", i)))
            .collect();

        let batches = split_into_batches(records, 3).unwrap();

        let sizes: Vec<usize> = batches.iter().map(RecordList::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(
            batches[1].as_slice()[0].get("Name").and_then(Value::as_str),
            Some("Acct3")
        );
        assert_eq!(
            batches[2].as_slice()[0].get("Name").and_then(Value::as_str),
            Some("Acct6")
        );
    }

    #[test]
    fn into_batches_rejects_out_of_range_sizes() {
        let list: RecordList<SObject> = RecordList::new();
        assert!(list.clone().into_batches(0).is_err());
        assert!(list.clone().into_batches(MAX_RECORDS_PER_BATCH + 1).is_err());
        assert!(list.into_batches(MAX_RECORDS_PER_BATCH).unwrap().is_empty());
    }
}
