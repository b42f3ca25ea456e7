//! Scripted in-memory `BulkApi` for tests.
//!
//! Each submitted batch consumes the next queued script of status steps; a
//! batch without a script completes on its first poll. Once a script runs
//! out the batch keeps reporting its last state. Results echo the submitted
//! records the way Salesforce would for the job's operation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::bulk::api::{ApiFuture, BulkApi};
use crate::bulk::batch::Batch;
use crate::bulk::results::RecordResult;
use crate::error::AppError;
use crate::salesforce::{
    BatchInfo, BatchState, BulkOperation, ContentType, CreateJobRequest, JobInfo, JobState,
};

/// One scripted answer to a batch status query.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    State(BatchState),
    Transient,
    Rejected,
}

struct FakeBatch {
    index: usize,
    info: BatchInfo,
    records: Vec<Map<String, Value>>,
    steps: VecDeque<Step>,
    polls: usize,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    jobs: HashMap<String, JobInfo>,
    batches: HashMap<String, FakeBatch>,
    batch_order: Vec<String>,
    scripts: VecDeque<Vec<Step>>,
    result_overrides: HashMap<String, Vec<RecordResult>>,
    reject_submit_at: HashSet<usize>,
    fail_results_at: HashSet<usize>,
    reject_create: bool,
    last_create: Option<CreateJobRequest>,
    submit_attempts: usize,
    close_calls: usize,
    abort_calls: usize,
    result_fetches: usize,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}FAKE{:010}", prefix, self.next_id)
    }
}

#[derive(Clone)]
pub(crate) struct FakeBulkApi {
    operation: BulkOperation,
    state: Arc<Mutex<FakeState>>,
}

impl FakeBulkApi {
    pub(crate) fn new(operation: BulkOperation) -> Self {
        Self {
            operation,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    pub(crate) fn script_next_batch(&self, steps: Vec<Step>) {
        self.with_state(|s| s.scripts.push_back(steps));
    }

    pub(crate) fn reject_job_creation(&self) {
        self.with_state(|s| s.reject_create = true);
    }

    /// Rejects the `n`-th submission attempt (0-based).
    pub(crate) fn reject_submit_at(&self, n: usize) {
        self.with_state(|s| s.reject_submit_at.insert(n));
    }

    /// Fails result retrieval of the `n`-th accepted batch with a transient error.
    pub(crate) fn fail_results_at(&self, n: usize) {
        self.with_state(|s| s.fail_results_at.insert(n));
    }

    pub(crate) fn set_result_override(&self, batch_id: &str, results: Vec<RecordResult>) {
        self.with_state(|s| s.result_overrides.insert(batch_id.to_string(), results));
    }

    pub(crate) fn set_job_state(&self, job_id: &str, state: JobState) {
        self.with_state(|s| {
            if let Some(job) = s.jobs.get_mut(job_id) {
                job.state = state;
            }
        });
    }

    /// Opens a job if needed and submits `n` generated records as one JSON batch.
    pub(crate) async fn submit_one(&self, n: usize) -> Batch {
        let job_id = self.with_state(|s| s.jobs.keys().next().cloned());
        let job_id = match job_id {
            Some(id) => id,
            None => {
                let req = CreateJobRequest {
                    operation: self.operation,
                    object: "Account".to_string(),
                    content_type: ContentType::Json,
                    external_id_field_name: None,
                    concurrency_mode: None,
                };
                BulkApi::create_job(self, req).await.unwrap().id
            }
        };

        let records: Vec<Value> = (0..n)
            .map(|i| serde_json::json!({ "Name": format!("Acct{}", i) }))
            .collect();
        let body = serde_json::to_vec(&records).unwrap();
        let info = BulkApi::submit_batch(self, &job_id, ContentType::Json, body)
            .await
            .unwrap();
        Batch::from_info(info, ContentType::Json, n)
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub(crate) fn jobs_created(&self) -> usize {
        self.with_state(|s| s.jobs.len())
    }

    pub(crate) fn last_create_request(&self) -> Option<CreateJobRequest> {
        self.with_state(|s| s.last_create.clone())
    }

    pub(crate) fn batches_submitted(&self) -> usize {
        self.with_state(|s| s.batch_order.len())
    }

    pub(crate) fn submit_attempts(&self) -> usize {
        self.with_state(|s| s.submit_attempts)
    }

    /// Status queries made for the `n`-th accepted batch.
    pub(crate) fn polls(&self, n: usize) -> usize {
        self.with_state(|s| {
            s.batch_order
                .get(n)
                .and_then(|id| s.batches.get(id))
                .map_or(0, |b| b.polls)
        })
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.with_state(|s| s.close_calls)
    }

    pub(crate) fn abort_calls(&self) -> usize {
        self.with_state(|s| s.abort_calls)
    }

    pub(crate) fn result_fetches(&self) -> usize {
        self.with_state(|s| s.result_fetches)
    }

    // ── Behaviour ─────────────────────────────────────────────────────────────

    fn set_job(&self, job_id: &str, state: JobState, counter: fn(&mut FakeState)) -> Result<JobInfo, AppError> {
        self.with_state(|s| {
            counter(s);
            let job = s
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound("Bulk job or batch not found".to_string()))?;
            job.state = state;
            Ok(job.clone())
        })
    }

    fn echo_results(&self, batch: &FakeBatch) -> Vec<RecordResult> {
        let terminal_failure = match batch.info.state {
            BatchState::NotProcessed => Some("BATCH_NOT_PROCESSED: Job was aborted".to_string()),
            BatchState::Failed => Some(
                batch
                    .info
                    .state_message
                    .clone()
                    .unwrap_or_else(|| "InvalidBatch".to_string()),
            ),
            _ => None,
        };

        batch
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                if let Some(message) = &terminal_failure {
                    return RecordResult::new(None, false, false, Some(message.clone()));
                }
                let input_id = record.get("Id").and_then(Value::as_str).map(str::to_string);
                match self.operation {
                    BulkOperation::Insert => RecordResult::new(
                        Some(format!("001FAKE{:03}{:06}", batch.index, i)),
                        true,
                        true,
                        None,
                    ),
                    BulkOperation::Upsert => {
                        let created = input_id.is_none();
                        let id = input_id
                            .or_else(|| Some(format!("001FAKE{:03}{:06}", batch.index, i)));
                        RecordResult::new(id, created, true, None)
                    }
                    BulkOperation::Update | BulkOperation::Delete => match input_id {
                        Some(id) => RecordResult::new(Some(id), false, true, None),
                        None => RecordResult::new(
                            None,
                            false,
                            false,
                            Some("MISSING_ARGUMENT: Id not specified".to_string()),
                        ),
                    },
                }
            })
            .collect()
    }
}

fn rejected(code: &str, message: &str) -> AppError {
    AppError::RemoteRejected {
        code: code.to_string(),
        message: message.to_string(),
    }
}

fn decode_body(content_type: ContentType, body: &[u8]) -> Result<Vec<Map<String, Value>>, AppError> {
    match content_type {
        ContentType::Json => serde_json::from_slice(body)
            .map_err(|e| rejected("InvalidBatch", &e.to_string())),
        ContentType::Csv => {
            let mut reader = csv::Reader::from_reader(body);
            let headers = reader
                .headers()
                .map_err(|e| rejected("InvalidBatch", &e.to_string()))?
                .clone();
            reader
                .records()
                .map(|row| {
                    let row = row.map_err(|e| rejected("InvalidBatch", &e.to_string()))?;
                    Ok(headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                        .collect())
                })
                .collect()
        }
    }
}

impl BulkApi for FakeBulkApi {
    fn create_job(&self, req: CreateJobRequest) -> ApiFuture<'_, JobInfo> {
        Box::pin(async move {
            self.with_state(|s| {
                if s.reject_create {
                    return Err(rejected("InvalidJob", "Unable to find object"));
                }
                let id = s.next_id("750");
                let info = JobInfo {
                    id: id.clone(),
                    operation: req.operation,
                    object: req.object.clone(),
                    state: JobState::Open,
                    content_type: Some(req.content_type),
                    external_id_field_name: req.external_id_field_name.clone(),
                    concurrency_mode: req.concurrency_mode,
                    number_batches_queued: 0,
                    number_batches_in_progress: 0,
                    number_batches_completed: 0,
                    number_batches_failed: 0,
                    number_batches_total: 0,
                    number_records_processed: 0,
                    number_records_failed: 0,
                };
                s.jobs.insert(id, info.clone());
                s.last_create = Some(req);
                Ok(info)
            })
        })
    }

    fn close_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(async move { self.set_job(job_id, JobState::Closed, |s| s.close_calls += 1) })
    }

    fn abort_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(async move { self.set_job(job_id, JobState::Aborted, |s| s.abort_calls += 1) })
    }

    fn get_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobInfo> {
        Box::pin(async move {
            self.with_state(|s| {
                let mut job = s
                    .jobs
                    .get(job_id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound("Bulk job or batch not found".to_string()))?;
                let batches: Vec<&FakeBatch> =
                    s.batches.values().filter(|b| b.info.job_id == job_id).collect();
                let count = |state: BatchState| {
                    batches.iter().filter(|b| b.info.state == state).count() as u64
                };
                job.number_batches_queued = count(BatchState::Queued);
                job.number_batches_in_progress = count(BatchState::InProgress);
                job.number_batches_completed = count(BatchState::Completed);
                job.number_batches_failed = count(BatchState::Failed);
                job.number_batches_total = batches.len() as u64;
                Ok(job)
            })
        })
    }

    fn submit_batch<'a>(
        &'a self,
        job_id: &'a str,
        content_type: ContentType,
        body: Vec<u8>,
    ) -> ApiFuture<'a, BatchInfo> {
        Box::pin(async move {
            self.with_state(|s| {
                let attempt = s.submit_attempts;
                s.submit_attempts += 1;

                let open = s.jobs.get(job_id).map(|j| j.state == JobState::Open);
                match open {
                    None => return Err(AppError::NotFound("Bulk job or batch not found".to_string())),
                    Some(false) => return Err(rejected("InvalidJobState", "Job is not open")),
                    Some(true) => {}
                }
                if s.reject_submit_at.contains(&attempt) {
                    return Err(rejected("InvalidBatch", "Records not processed"));
                }

                let records = decode_body(content_type, &body)?;
                let id = s.next_id("751");
                let info = BatchInfo {
                    id: id.clone(),
                    job_id: job_id.to_string(),
                    state: BatchState::Queued,
                    state_message: None,
                    number_records_processed: 0,
                    number_records_failed: 0,
                };
                let steps = s
                    .scripts
                    .pop_front()
                    .unwrap_or_else(|| vec![Step::State(BatchState::Completed)]);
                let index = s.batch_order.len();
                s.batch_order.push(id.clone());
                s.batches.insert(
                    id,
                    FakeBatch {
                        index,
                        info: info.clone(),
                        records,
                        steps: steps.into(),
                        polls: 0,
                    },
                );
                Ok(info)
            })
        })
    }

    fn get_batch<'a>(&'a self, _job_id: &'a str, batch_id: &'a str) -> ApiFuture<'a, BatchInfo> {
        Box::pin(async move {
            self.with_state(|s| {
                let batch = s
                    .batches
                    .get_mut(batch_id)
                    .ok_or_else(|| AppError::NotFound("Bulk job or batch not found".to_string()))?;
                batch.polls += 1;

                match batch.steps.pop_front() {
                    Some(Step::Transient) => {
                        return Err(AppError::ConnectionFailed("HTTP 503 - Service Unavailable".to_string()))
                    }
                    Some(Step::Rejected) => return Err(rejected("InvalidBatch", "Unknown batch")),
                    Some(Step::State(state)) => {
                        batch.info.state = state;
                        if state.is_terminal() {
                            let n = batch.records.len() as u64;
                            batch.info.number_records_processed = n;
                            if state != BatchState::Completed {
                                batch.info.number_records_failed = n;
                            }
                        }
                    }
                    None => {}
                }
                Ok(batch.info.clone())
            })
        })
    }

    fn get_batch_result<'a>(
        &'a self,
        _job_id: &'a str,
        batch_id: &'a str,
        _content_type: ContentType,
    ) -> ApiFuture<'a, Vec<RecordResult>> {
        Box::pin(async move {
            self.with_state(|s| {
                s.result_fetches += 1;
                if let Some(results) = s.result_overrides.get(batch_id) {
                    return Ok(results.clone());
                }
                let batch = s
                    .batches
                    .get(batch_id)
                    .ok_or_else(|| AppError::NotFound("Bulk job or batch not found".to_string()))?;
                if s.fail_results_at.contains(&batch.index) {
                    return Err(AppError::ConnectionFailed(
                        "Connection to Salesforce failed".to_string(),
                    ));
                }
                Ok(self.echo_results(batch))
            })
        })
    }
}
