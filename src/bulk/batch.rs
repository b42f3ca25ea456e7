//! Batch Submitter and the batch state value.

use std::cmp::max;

use serde::Serialize;
use tracing::info;

use crate::bulk::api::BulkApi;
use crate::bulk::codec::encode_records;
use crate::bulk::job::Job;
use crate::bulk::records::{Record, RecordList, MAX_RECORDS_PER_BATCH};
use crate::error::AppError;
use crate::salesforce::client::redact_id;
use crate::salesforce::{BatchInfo, BatchState, ContentType};

/// A submitted batch as last observed.
///
/// `record_count` is the size of the submitted container and is what the
/// result count is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub id: String,
    pub job_id: String,
    pub state: BatchState,
    pub state_message: Option<String>,
    pub content_type: ContentType,
    pub record_count: usize,
    pub records_processed: u64,
    pub records_failed: u64,
}

impl Batch {
    pub(crate) fn from_info(info: BatchInfo, content_type: ContentType, record_count: usize) -> Self {
        Self {
            id: info.id,
            job_id: info.job_id,
            state: info.state,
            state_message: info.state_message,
            content_type,
            record_count,
            records_processed: info.number_records_processed,
            records_failed: info.number_records_failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns this batch updated with a status payload.
    ///
    /// State only moves forward: a payload that would move a batch back
    /// (or out of a terminal state) leaves the state unchanged.
    pub(crate) fn apply(&self, info: BatchInfo) -> Batch {
        let mut next = self.clone();
        if !self.is_terminal() && info.state.rank() >= self.state.rank() {
            next.state = info.state;
            if info.state_message.is_some() {
                next.state_message = info.state_message;
            }
        }
        next.records_processed = max(self.records_processed, info.number_records_processed);
        next.records_failed = max(self.records_failed, info.number_records_failed);
        next
    }
}

/// Encodes `records` and uploads them as one batch of `job`.
///
/// # Errors
///
/// - `AppError::InvalidState` - The job is not `Open`
/// - `AppError::InvalidRequest` - Empty container, or more records than one batch holds
/// - `AppError::InvalidRecord` - A record cannot be encoded in the job's content type
pub async fn submit_batch<C, R>(
    client: &C,
    job: &Job,
    records: &RecordList<R>,
) -> Result<Batch, AppError>
where
    C: BulkApi,
    R: Record,
{
    job.ensure_open("submit a batch to")?;
    check_batch_size(records.len())?;

    let body = encode_records(records, job.content_type)?;
    let info = client.submit_batch(&job.id, job.content_type, body).await?;
    let batch = Batch::from_info(info, job.content_type, records.len());

    info!(
        "[BULK-ORCHESTRATOR] Submitted batch {} to job {} ({} records)",
        redact_id(&batch.id),
        redact_id(&job.id),
        batch.record_count
    );
    Ok(batch)
}

pub(crate) fn check_batch_size(len: usize) -> Result<(), AppError> {
    if len == 0 {
        return Err(AppError::InvalidRequest(
            "Cannot submit an empty batch".to_string(),
        ));
    }
    if len > MAX_RECORDS_PER_BATCH {
        return Err(AppError::InvalidRequest(format!(
            "Batch has {} records; the limit is {}",
            len, MAX_RECORDS_PER_BATCH
        )));
    }
    Ok(())
}
