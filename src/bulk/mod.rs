//! Bulk job/batch lifecycle: records, submission, polling, result collection
//! and the orchestrator tying them together.

pub mod api;
pub mod batch;
pub mod codec;
pub mod job;
pub mod orchestrator;
pub mod poller;
pub mod records;
pub mod results;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{ApiFuture, BulkApi};
pub use batch::{submit_batch, Batch};
pub use codec::{decode_results, encode_records};
pub use job::{abort_job, close_job, create_job, poll_job, Job, JobProgress, JobSpec};
pub use orchestrator::{BatchFailure, BulkOrchestrator, Interruption, JobRunReport, SubmittedJob};
pub use poller::{poll_batch, wait_for_terminal, Backoff};
pub use records::{split_into_batches, Record, RecordList, SObject, MAX_RECORDS_PER_BATCH};
pub use results::{get_batch_result, RecordResult, ResultSet};
pub use scheduler::{BatchPermit, BatchScheduler};
