//! Job orchestration: create, submit, close, then poll and collect every batch.
//!
//! Batches are driven concurrently, one task per batch in a `JoinSet`, each with
//! its own backoff schedule. A batch that fails (submission, polling or result
//! retrieval) is reported by index; its siblings carry on. Results come back in
//! submission order regardless of completion order.
//!
//! Cancellation and the overall deadline stop polling and return whatever was
//! collected so far. Neither aborts the remote job.

use std::collections::HashMap;
use std::future::pending;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::bulk::api::BulkApi;
use crate::bulk::batch::{check_batch_size, submit_batch, Batch};
use crate::bulk::job::{close_job, create_job, Job, JobSpec};
use crate::bulk::poller::track_until_terminal;
use crate::bulk::records::{Record, RecordList};
use crate::bulk::results::{get_batch_result, ResultSet};
use crate::bulk::scheduler::BatchScheduler;
use crate::config::{BulkConfig, PollPolicy};
use crate::error::AppError;
use crate::salesforce::client::redact_id;
use crate::salesforce::BulkOperation;

// ─────────────────────────────────────────────────────────────────────────────
// Report Types
// ─────────────────────────────────────────────────────────────────────────────

/// Why a run stopped before every batch finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded { after_ms: u64 },
}

impl Interruption {
    fn into_error(self) -> AppError {
        match self {
            Interruption::Cancelled => AppError::Cancelled,
            Interruption::DeadlineExceeded { after_ms } => AppError::DeadlineExceeded { after_ms },
        }
    }
}

/// A batch that produced no result set.
#[derive(Debug, Serialize)]
pub struct BatchFailure {
    /// Position of the container in the submitted sequence.
    pub index: usize,
    pub error: AppError,
}

/// A job whose batches were submitted and which was closed, not yet polled.
#[derive(Debug)]
pub struct SubmittedJob {
    pub run_id: Uuid,
    pub job: Job,
    /// One slot per container; `None` where submission failed or never happened.
    pub batches: Vec<Option<Batch>>,
    pub failures: Vec<BatchFailure>,
    started_at: Instant,
}

/// Outcome of a run, by submission index.
///
/// `results[i]` is the result set of container `i` when it was collected.
/// An index without a result is either in `failures` or, if the run was
/// interrupted, still pending.
#[derive(Debug, Serialize)]
pub struct JobRunReport {
    pub run_id: String,
    pub job: Job,
    pub batches: Vec<Option<Batch>>,
    pub results: Vec<Option<ResultSet>>,
    pub failures: Vec<BatchFailure>,
    pub interruption: Option<Interruption>,
}

impl JobRunReport {
    /// True when every batch produced a result set.
    pub fn is_success(&self) -> bool {
        self.interruption.is_none()
            && self.failures.is_empty()
            && self.results.iter().all(Option::is_some)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Indices with neither a result nor a failure.
    pub fn pending_indices(&self) -> Vec<usize> {
        let failed = self.failed_indices();
        self.results
            .iter()
            .enumerate()
            .filter(|(i, r)| r.is_none() && !failed.contains(i))
            .map(|(i, _)| i)
            .collect()
    }

    /// All result sets in submission order, or the reason they are incomplete.
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled` / `AppError::DeadlineExceeded` - The run was interrupted
    /// - `AppError::BatchesFailed` - Some batches failed; names their indices
    pub fn result_sets(self) -> Result<Vec<ResultSet>, AppError> {
        if let Some(interruption) = self.interruption {
            return Err(interruption.into_error());
        }
        if !self.failures.is_empty() {
            return Err(AppError::BatchesFailed {
                indices: self.failed_indices(),
            });
        }
        self.results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppError::Internal("Run finished with uncollected batches".to_string()))
    }
}

/// What one batch task hands back.
struct BatchOutcome {
    index: usize,
    batch: Batch,
    result: Result<ResultSet, AppError>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives jobs end to end over a `BulkApi`.
pub struct BulkOrchestrator<C: BulkApi> {
    client: C,
    config: BulkConfig,
    scheduler: BatchScheduler,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl<C: BulkApi> BulkOrchestrator<C> {
    /// # Errors
    ///
    /// `AppError::Config` if `config` does not validate.
    pub fn new(client: C, config: &BulkConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            client,
            scheduler: BatchScheduler::new(config.max_concurrent_batches),
            cancel: CancellationToken::new(),
            deadline: config.poll.deadline(),
            config: config.clone(),
        })
    }

    /// Uses `token` to stop runs; cancelling it stops polling in every run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Overall budget per run, measured from job creation.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.config.poll
    }

    /// Creates a job, submits each container as one batch, closes the job,
    /// then polls every batch to a terminal state and collects its results.
    ///
    /// # Errors
    ///
    /// Fails only when the run cannot get going: invalid input, job creation
    /// or job close failed. Per-batch problems are in the report.
    pub async fn run_job_and_poll<R: Record>(
        &self,
        object: &str,
        operation: BulkOperation,
        containers: Vec<RecordList<R>>,
    ) -> Result<JobRunReport, AppError> {
        let spec = JobSpec::new(object, operation).with_content_type(self.config.content_type);
        self.run_spec_and_poll(&spec, containers).await
    }

    /// Same as `run_job_and_poll` for a fully specified job.
    pub async fn run_spec_and_poll<R: Record>(
        &self,
        spec: &JobSpec,
        containers: Vec<RecordList<R>>,
    ) -> Result<JobRunReport, AppError> {
        let submitted = self.run_job(spec, containers).await?;
        Ok(self.poll_submitted(submitted).await)
    }

    /// Creates the job, submits every container in order and closes the job,
    /// without waiting for processing.
    ///
    /// A container whose submission fails is recorded as a failure at its
    /// index; the remaining containers are still submitted. If cancelled,
    /// submission stops and the job is closed.
    pub async fn run_job<R: Record>(
        &self,
        spec: &JobSpec,
        containers: Vec<RecordList<R>>,
    ) -> Result<SubmittedJob, AppError> {
        if containers.is_empty() {
            return Err(AppError::InvalidRequest(
                "At least one record container is required".to_string(),
            ));
        }
        for (index, container) in containers.iter().enumerate() {
            check_batch_size(container.len()).map_err(|e| match e {
                AppError::InvalidRequest(msg) => {
                    AppError::InvalidRequest(format!("container {}: {}", index, msg))
                }
                other => other,
            })?;
        }
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        let job = create_job(&self.client, spec).await?;

        info!(
            "[BULK-ORCHESTRATOR] Run {} submitting {} batches to job {}",
            run_id,
            containers.len(),
            redact_id(&job.id)
        );

        let mut batches: Vec<Option<Batch>> = Vec::with_capacity(containers.len());
        let mut failures = Vec::new();

        for (index, container) in containers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(
                    "[BULK-ORCHESTRATOR] Run {} cancelled after {} of {} submissions",
                    run_id,
                    index,
                    containers.len()
                );
                break;
            }

            match submit_batch(&self.client, &job, container).await {
                Ok(batch) => batches.push(Some(batch)),
                Err(error) => {
                    info!(
                        "[BULK-ORCHESTRATOR] Run {} batch {} submission failed: {}",
                        run_id,
                        index,
                        error.safe_message()
                    );
                    batches.push(None);
                    failures.push(BatchFailure { index, error });
                }
            }
        }
        batches.resize_with(containers.len(), || None);

        let job = close_job(&self.client, &job).await?;

        Ok(SubmittedJob {
            run_id,
            job,
            batches,
            failures,
            started_at,
        })
    }

    /// Polls every submitted batch to a terminal state and collects results.
    ///
    /// Never fails as a whole: per-batch errors and interruptions are
    /// reported in the returned `JobRunReport`.
    pub async fn poll_submitted(&self, submitted: SubmittedJob) -> JobRunReport {
        let SubmittedJob {
            run_id,
            job,
            batches,
            mut failures,
            started_at,
        } = submitted;

        let total = batches.len();
        let mut latest = batches.clone();
        let mut results: Vec<Option<ResultSet>> = vec![None; total];

        let mut join_set: JoinSet<BatchOutcome> = JoinSet::new();
        let mut task_index = HashMap::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let Some(batch) = batch else { continue };

            let client = self.client.clone();
            let policy = self.config.poll.clone();
            let scheduler = self.scheduler.clone();
            let cancel = self.cancel.child_token();

            let handle = join_set.spawn(async move {
                drive_batch(client, index, batch, policy, scheduler, cancel).await
            });
            task_index.insert(handle.id(), index);
        }

        // A deadline too far out to represent never fires.
        let deadline_at = self.deadline.and_then(|d| started_at.checked_add(d));
        let mut interruption = None;

        while !join_set.is_empty() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    interruption = Some(Interruption::Cancelled);
                    break;
                }
                _ = sleep_until(deadline_at) => {
                    interruption = Some(Interruption::DeadlineExceeded {
                        after_ms: self.deadline.map_or(0, |d| d.as_millis() as u64),
                    });
                    break;
                }
                joined = join_set.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        let index = outcome.index;
                        latest[index] = Some(outcome.batch);
                        match outcome.result {
                            Ok(set) => results[index] = Some(set),
                            Err(error) => {
                                info!(
                                    "[BULK-ORCHESTRATOR] Run {} batch {} failed: {}",
                                    run_id,
                                    index,
                                    error.safe_message()
                                );
                                failures.push(BatchFailure { index, error });
                            }
                        }
                    }
                    Some(Err(join_error)) => {
                        if let Some(&index) = task_index.get(&join_error.id()) {
                            info!(
                                "[BULK-ORCHESTRATOR] Run {} batch {} task error: {}",
                                run_id, index, join_error
                            );
                            failures.push(BatchFailure {
                                index,
                                error: AppError::Internal(format!("Batch task failed: {}", join_error)),
                            });
                        }
                    }
                    None => break,
                }
            }
        }

        // Stop polling whatever is still in flight; the remote job is left alone.
        join_set.abort_all();

        if interruption.is_none() && self.cancel.is_cancelled() {
            let unfinished = (0..total)
                .any(|i| results[i].is_none() && !failures.iter().any(|f| f.index == i));
            if unfinished {
                interruption = Some(Interruption::Cancelled);
            }
        }

        failures.sort_by_key(|f| f.index);

        let collected = results.iter().filter(|r| r.is_some()).count();
        info!(
            "[BULK-ORCHESTRATOR] Run {} finished: {}/{} collected, {} failed{}",
            run_id,
            collected,
            total,
            failures.len(),
            match interruption {
                Some(Interruption::Cancelled) => ", cancelled",
                Some(Interruption::DeadlineExceeded { .. }) => ", deadline exceeded",
                None => "",
            }
        );

        JobRunReport {
            run_id: run_id.to_string(),
            job,
            batches: latest,
            results,
            failures,
            interruption,
        }
    }
}

/// Polls one batch to a terminal state and fetches its results, holding a
/// scheduler slot throughout.
async fn drive_batch<C: BulkApi>(
    client: C,
    index: usize,
    batch: Batch,
    policy: PollPolicy,
    scheduler: BatchScheduler,
    cancel: CancellationToken,
) -> BatchOutcome {
    let _permit = match scheduler.acquire().await {
        Ok(permit) => permit,
        Err(error) => {
            return BatchOutcome {
                index,
                batch,
                result: Err(error),
            }
        }
    };

    let mut batch = batch;
    let result = match track_until_terminal(&client, &mut batch, &policy, &cancel).await {
        Ok(()) => get_batch_result(&client, &batch).await,
        Err(error) => Err(error),
    };
    BatchOutcome {
        index,
        batch,
        result,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
