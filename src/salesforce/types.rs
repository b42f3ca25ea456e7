//! Wire types for the Bulk API job/batch resources.
//!
//! Enum spellings match what Salesforce sends and expects on the wire; the
//! state enums are shared with the orchestration layer unchanged.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk operation type.
///
/// IMPORTANT: Uses `#[serde(rename_all = "lowercase")]` to match Salesforce API
/// which expects lowercase values ("insert", "update", "upsert", "delete").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    /// Insert new records.
    Insert,
    /// Update existing records by ID.
    Update,
    /// Insert or update records based on external ID field.
    Upsert,
    /// Delete records by ID.
    Delete,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Insert => "insert",
            BulkOperation::Update => "update",
            BulkOperation::Upsert => "upsert",
            BulkOperation::Delete => "delete",
        }
    }
}

/// Encoding of batch bodies and batch results for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    #[default]
    Json,
    Csv,
}

impl ContentType {
    /// HTTP `Content-Type` header value for batch uploads.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Csv => "text/csv",
        }
    }
}

/// How Salesforce schedules the batches of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    Parallel,
    Serial,
}

/// Job-level state.
///
/// A job starts `Open`, becomes `Closed` after an explicit close and never
/// re-opens. `Failed` is only ever reported by Salesforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Open,
    Closed,
    Aborted,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Open => "Open",
            JobState::Closed => "Closed",
            JobState::Aborted => "Aborted",
            JobState::Failed => "Failed",
        }
    }
}

/// Batch-level state. `Completed`, `Failed` and `NotProcessed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    NotProcessed,
}

impl BatchState {
    /// Returns true if no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Failed | BatchState::NotProcessed
        )
    }

    /// Position along the one-way path Queued -> InProgress -> terminal.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            BatchState::Queued => 0,
            BatchState::InProgress => 1,
            BatchState::Completed | BatchState::Failed | BatchState::NotProcessed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Queued => "Queued",
            BatchState::InProgress => "InProgress",
            BatchState::Completed => "Completed",
            BatchState::Failed => "Failed",
            BatchState::NotProcessed => "NotProcessed",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for creating a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// The operation to perform.
    pub operation: BulkOperation,
    /// The Salesforce object name (e.g., "Account", "Contact").
    pub object: String,
    /// Encoding used for this job's batches.
    pub content_type: ContentType,
    /// External ID field name (required for upsert operations).
    /// Skipped when None because Salesforce rejects null values for this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency_mode: Option<ConcurrencyMode>,
}

/// Job information as returned by create, close, abort and status calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: String,
    pub operation: BulkOperation,
    pub object: String,
    pub state: JobState,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub external_id_field_name: Option<String>,
    #[serde(default)]
    pub concurrency_mode: Option<ConcurrencyMode>,
    #[serde(default)]
    pub number_batches_queued: u64,
    #[serde(default)]
    pub number_batches_in_progress: u64,
    #[serde(default)]
    pub number_batches_completed: u64,
    #[serde(default)]
    pub number_batches_failed: u64,
    #[serde(default)]
    pub number_batches_total: u64,
    #[serde(default)]
    pub number_records_processed: u64,
    #[serde(default)]
    pub number_records_failed: u64,
}

/// Batch information as returned by submit and status calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub id: String,
    pub job_id: String,
    pub state: BatchState,
    /// Salesforce's explanation for Failed / NotProcessed batches.
    #[serde(default)]
    pub state_message: Option<String>,
    #[serde(default)]
    pub number_records_processed: u64,
    #[serde(default)]
    pub number_records_failed: u64,
}

/// Request body for changing job state (close or abort).
#[derive(Debug, Serialize)]
pub(crate) struct UpdateJobStateRequest {
    pub state: JobState,
}

/// One element of a JSON batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultRow {
    #[serde(default)]
    pub id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub errors: Vec<ResultError>,
}

/// A per-record error inside a batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultError {
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}
