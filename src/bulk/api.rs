//! The seam between orchestration and transport.

use std::future::Future;
use std::pin::Pin;

use crate::bulk::results::RecordResult;
use crate::error::AppError;
use crate::salesforce::bulk_v1::BulkV1Client;
use crate::salesforce::{BatchInfo, ContentType, CreateJobRequest, JobInfo};

/// Boxed future returned by every `BulkApi` call.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Remote job/batch operations, allowing test fakes.
///
/// Implementations perform exactly one remote call per method and never
/// retry; retry policy lives with the caller.
pub trait BulkApi: Send + Sync + Clone + 'static {
    /// Creates a new job.
    fn create_job(&self, req: CreateJobRequest) -> ApiFuture<'_, JobInfo>;

    /// Closes the job so no further batches are accepted.
    fn close_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo>;

    /// Aborts the job; unprocessed batches become NotProcessed.
    fn abort_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo>;

    /// Reads the current job state and counters.
    fn get_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo>;

    /// Uploads one encoded batch body.
    fn submit_batch<'a>(
        &'a self,
        job_id: &'a str,
        content_type: ContentType,
        body: Vec<u8>,
    ) -> ApiFuture<'a, BatchInfo>;

    /// Reads the current batch state.
    fn get_batch<'a>(&'a self, job_id: &'a str, batch_id: &'a str) -> ApiFuture<'a, BatchInfo>;

    /// Fetches and decodes the per-record outcomes of a batch, in record order.
    fn get_batch_result<'a>(
        &'a self,
        job_id: &'a str,
        batch_id: &'a str,
        content_type: ContentType,
    ) -> ApiFuture<'a, Vec<RecordResult>>;
}

/// Implementation of BulkApi for the real Bulk API v1 client.
impl BulkApi for BulkV1Client {
    fn create_job(&self, req: CreateJobRequest) -> ApiFuture<'_, JobInfo> {
        Box::pin(BulkV1Client::create_job(self, req))
    }

    fn close_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(BulkV1Client::close_job(self, job_id))
    }

    fn abort_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(BulkV1Client::abort_job(self, job_id))
    }

    fn get_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(BulkV1Client::get_job(self, job_id))
    }

    fn submit_batch<'a>(
        &'a self,
        job_id: &'a str,
        content_type: ContentType,
        body: Vec<u8>,
    ) -> ApiFuture<'a, BatchInfo> {
        Box::pin(BulkV1Client::submit_batch(self, job_id, content_type, body))
    }

    fn get_batch<'a>(&'a self, job_id: &'a str, batch_id: &'a str) -> ApiFuture<'a, BatchInfo> {
        Box::pin(BulkV1Client::get_batch(self, job_id, batch_id))
    }

    fn get_batch_result<'a>(
        &'a self,
        job_id: &'a str,
        batch_id: &'a str,
        content_type: ContentType,
    ) -> ApiFuture<'a, Vec<RecordResult>> {
        Box::pin(BulkV1Client::get_batch_result(
            self,
            job_id,
            batch_id,
            content_type,
        ))
    }
}
