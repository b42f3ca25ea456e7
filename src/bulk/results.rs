//! Result Collector: per-record outcomes of a terminal batch.

use std::ops::Deref;

use serde::Serialize;
use tracing::info;

use crate::bulk::api::BulkApi;
use crate::bulk::batch::Batch;
use crate::error::AppError;
use crate::salesforce::client::redact_id;
use crate::salesforce::BatchResultRow;

/// Message used when Salesforce reports a failure without any detail.
const UNKNOWN_ERROR: &str = "Unknown error";

// ─────────────────────────────────────────────────────────────────────────────
// RecordResult
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one submitted record.
///
/// `error_message` is set exactly when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordResult {
    /// Record id assigned or confirmed by Salesforce.
    pub id: Option<String>,
    pub created: bool,
    pub success: bool,
    pub error_message: Option<String>,
}

impl RecordResult {
    pub fn new(
        id: Option<String>,
        created: bool,
        success: bool,
        error_message: Option<String>,
    ) -> Self {
        let error_message = if success {
            None
        } else {
            Some(
                error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            )
        };

        Self {
            id,
            created,
            success,
            error_message,
        }
    }
}

impl From<BatchResultRow> for RecordResult {
    fn from(row: BatchResultRow) -> Self {
        let message = row
            .errors
            .iter()
            .map(|e| match &e.status_code {
                Some(code) if !code.is_empty() => format!("{}: {}", code, e.message),
                _ => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        RecordResult::new(row.id, row.created, row.success, Some(message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResultSet
// ─────────────────────────────────────────────────────────────────────────────

/// The outcomes of one batch, positionally aligned with its submitted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub batch_id: String,
    records: Vec<RecordResult>,
}

impl ResultSet {
    pub fn new(batch_id: impl Into<String>, records: Vec<RecordResult>) -> Self {
        Self {
            batch_id: batch_id.into(),
            records,
        }
    }

    pub fn records(&self) -> &[RecordResult] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RecordResult> {
        self.records
    }

    /// Number of records whose outcome was a success.
    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }

    /// Positions (within the batch) of records that failed.
    pub fn failures(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.success)
            .map(|(i, _)| i)
            .collect()
    }
}

impl Deref for ResultSet {
    type Target = [RecordResult];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl IntoIterator for ResultSet {
    type Item = RecordResult;
    type IntoIter = std::vec::IntoIter<RecordResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a RecordResult;
    type IntoIter = std::slice::Iter<'a, RecordResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collection
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches and decodes the results of a terminal batch.
///
/// Makes exactly one remote call and never retries.
///
/// # Errors
///
/// - `AppError::InvalidState` - The batch is not terminal yet
/// - `AppError::ResultMismatch` - Result count differs from the submitted record count
/// - Transport errors as returned by the client
pub async fn get_batch_result<C: BulkApi>(client: &C, batch: &Batch) -> Result<ResultSet, AppError> {
    if !batch.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Batch {} is {}; results are only available once it is terminal",
            redact_id(&batch.id),
            batch.state.as_str()
        )));
    }

    let records = client
        .get_batch_result(&batch.job_id, &batch.id, batch.content_type)
        .await?;

    if records.len() != batch.record_count {
        return Err(AppError::ResultMismatch {
            batch_id: batch.id.clone(),
            expected: batch.record_count,
            actual: records.len(),
        });
    }

    let result = ResultSet::new(batch.id.clone(), records);
    info!(
        "[BULK-POLL] Collected batch {}: {} ok, {} failed",
        redact_id(&batch.id),
        result.successes(),
        result.len() - result.successes()
    );
    Ok(result)
}
