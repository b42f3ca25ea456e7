//! Job Handle: create, close, abort and refresh a bulk job.

use serde::Serialize;
use tracing::info;

use crate::bulk::api::BulkApi;
use crate::error::AppError;
use crate::salesforce::client::redact_id;
use crate::salesforce::{
    BulkOperation, ConcurrencyMode, ContentType, CreateJobRequest, JobInfo, JobState,
};

// ─────────────────────────────────────────────────────────────────────────────
// JobSpec
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to open a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub object: String,
    pub operation: BulkOperation,
    pub content_type: ContentType,
    /// Required for upsert; the field matched against existing records.
    pub external_id_field_name: Option<String>,
    pub concurrency_mode: Option<ConcurrencyMode>,
}

impl JobSpec {
    pub fn new(object: impl Into<String>, operation: BulkOperation) -> Self {
        Self {
            object: object.into(),
            operation,
            content_type: ContentType::default(),
            external_id_field_name: None,
            concurrency_mode: None,
        }
    }

    pub fn with_external_id_field(mut self, field: impl Into<String>) -> Self {
        self.external_id_field_name = Some(field.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_concurrency_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = Some(mode);
        self
    }

    /// Checks the fields locally and builds the wire request.
    pub(crate) fn to_request(&self) -> Result<CreateJobRequest, AppError> {
        if self.object.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Object name must not be empty".to_string(),
            ));
        }

        let external_id = self
            .external_id_field_name
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        if self.operation == BulkOperation::Upsert && external_id.is_none() {
            return Err(AppError::InvalidRequest(
                "Upsert requires an external ID field".to_string(),
            ));
        }

        Ok(CreateJobRequest {
            operation: self.operation,
            object: self.object.clone(),
            content_type: self.content_type,
            external_id_field_name: external_id.map(str::to_string),
            concurrency_mode: self.concurrency_mode,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// Batch and record counters reported for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub batches_queued: u64,
    pub batches_in_progress: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub batches_total: u64,
    pub records_processed: u64,
    pub records_failed: u64,
}

/// A remote job as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: String,
    pub object: String,
    pub operation: BulkOperation,
    pub content_type: ContentType,
    pub external_id_field_name: Option<String>,
    pub state: JobState,
    pub progress: JobProgress,
}

impl Job {
    /// Builds a job from a status payload. `content_type` is used when the
    /// payload omits it.
    pub(crate) fn from_info(info: JobInfo, content_type: ContentType) -> Self {
        Self {
            progress: JobProgress {
                batches_queued: info.number_batches_queued,
                batches_in_progress: info.number_batches_in_progress,
                batches_completed: info.number_batches_completed,
                batches_failed: info.number_batches_failed,
                batches_total: info.number_batches_total,
                records_processed: info.number_records_processed,
                records_failed: info.number_records_failed,
            },
            id: info.id,
            object: info.object,
            operation: info.operation,
            content_type: info.content_type.unwrap_or(content_type),
            external_id_field_name: info.external_id_field_name,
            state: info.state,
        }
    }

    /// Refreshes state and counters, keeping locally known fields the payload lacks.
    fn updated(&self, info: JobInfo) -> Self {
        let external_id = info
            .external_id_field_name
            .clone()
            .or_else(|| self.external_id_field_name.clone());
        let mut job = Job::from_info(info, self.content_type);
        job.external_id_field_name = external_id;
        job
    }

    pub fn is_open(&self) -> bool {
        self.state == JobState::Open
    }

    pub(crate) fn ensure_open(&self, action: &str) -> Result<(), AppError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "Cannot {} job {} in state {}",
                action,
                redact_id(&self.id),
                self.state.as_str()
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Opens a new job. The returned job is `Open`.
///
/// # Errors
///
/// - `AppError::InvalidRequest` - Empty object name, or upsert without external ID
/// - `AppError::RemoteRejected` - Object or operation not valid for this org
pub async fn create_job<C: BulkApi>(client: &C, spec: &JobSpec) -> Result<Job, AppError> {
    let request = spec.to_request()?;
    let info = client.create_job(request).await?;
    let job = Job::from_info(info, spec.content_type);

    info!(
        "[BULK-ORCHESTRATOR] Created {} job {} on {}",
        job.operation.as_str(),
        redact_id(&job.id),
        job.object
    );
    Ok(job)
}

/// Closes an open job. Salesforce keeps processing batches already submitted;
/// this does not wait for them.
///
/// # Errors
///
/// `AppError::InvalidState` if the job is not `Open`.
pub async fn close_job<C: BulkApi>(client: &C, job: &Job) -> Result<Job, AppError> {
    job.ensure_open("close")?;
    let info = client.close_job(&job.id).await?;
    Ok(job.updated(info))
}

/// Aborts a job that is still `Open` or `Closed`.
///
/// # Errors
///
/// `AppError::InvalidState` if the job is already `Aborted` or `Failed`.
pub async fn abort_job<C: BulkApi>(client: &C, job: &Job) -> Result<Job, AppError> {
    if !matches!(job.state, JobState::Open | JobState::Closed) {
        return Err(AppError::InvalidState(format!(
            "Cannot abort job {} in state {}",
            redact_id(&job.id),
            job.state.as_str()
        )));
    }

    let info = client.abort_job(&job.id).await?;
    info!("[BULK-ORCHESTRATOR] Aborted job {}", redact_id(&job.id));
    Ok(job.updated(info))
}

/// Re-reads a job's state and batch counters.
pub async fn poll_job<C: BulkApi>(client: &C, job: &Job) -> Result<Job, AppError> {
    let info = client.get_job(&job.id).await?;
    Ok(job.updated(info))
}
