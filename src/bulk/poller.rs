//! Batch Poller: status queries, backoff schedule and settle delay.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bulk::api::BulkApi;
use crate::bulk::batch::Batch;
use crate::config::PollPolicy;
use crate::error::AppError;
use crate::salesforce::client::redact_id;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff
// ─────────────────────────────────────────────────────────────────────────────

/// Wait intervals between status queries of one batch.
///
/// Starts at the initial interval and grows by the growth factor on every
/// step, saturating at the cap when one is set. With a growth factor of at
/// least 1.0 the sequence is non-decreasing.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: f64,
    max: Option<Duration>,
}

impl Backoff {
    pub fn new(policy: &PollPolicy) -> Self {
        Self::with_parts(
            policy.initial_interval(),
            policy.growth_factor,
            policy.max_interval(),
        )
    }

    pub fn with_parts(initial: Duration, factor: f64, max: Option<Duration>) -> Self {
        Self {
            next: cap(initial, max),
            factor,
            max,
        }
    }

    /// Returns the current interval and advances the schedule.
    pub fn next_interval(&mut self) -> Duration {
        let current = self.next;
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(Duration::MAX);
        self.next = cap(grown.max(current), self.max);
        current
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_interval())
    }
}

fn cap(interval: Duration, max: Option<Duration>) -> Duration {
    match max {
        Some(max) => interval.min(max),
        None => interval,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling
// ─────────────────────────────────────────────────────────────────────────────

/// Performs one status query.
///
/// A terminal batch is returned as-is without a remote call. Failures are
/// returned to the caller unretried.
pub async fn poll_batch<C: BulkApi>(client: &C, batch: &Batch) -> Result<Batch, AppError> {
    if batch.is_terminal() {
        return Ok(batch.clone());
    }

    let info = client.get_batch(&batch.job_id, &batch.id).await?;
    Ok(batch.apply(info))
}

/// Polls `batch` on its backoff schedule until it is terminal, then waits the
/// settle delay once.
///
/// Up to `policy.max_consecutive_errors` transient failures in a row are
/// absorbed; the next one is returned.
///
/// # Errors
///
/// - `AppError::Cancelled` - `cancel` fired while waiting
/// - Any non-transient polling error, or a transient one past the tolerance
pub async fn wait_for_terminal<C: BulkApi>(
    client: &C,
    batch: Batch,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Batch, AppError> {
    let mut current = batch;
    track_until_terminal(client, &mut current, policy, cancel).await?;
    Ok(current)
}

/// Same loop as [`wait_for_terminal`], updating `current` in place so the last
/// observed state survives a failed poll.
pub(crate) async fn track_until_terminal<C: BulkApi>(
    client: &C,
    current: &mut Batch,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let mut backoff = Backoff::new(policy);
    let mut consecutive_errors = 0u32;
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let mut wait = backoff.next_interval();

        match poll_batch(client, current).await {
            Ok(next) => {
                polls += 1;
                consecutive_errors = 0;
                if next.state != current.state {
                    info!(
                        "[BULK-POLL] Batch {} {} -> {}",
                        redact_id(&next.id),
                        current.state.as_str(),
                        next.state.as_str()
                    );
                }
                *current = next;

                if current.is_terminal() {
                    info!(
                        "[BULK-POLL] Batch {} terminal after {} polls, settling {}ms",
                        redact_id(&current.id),
                        polls,
                        policy.settle_delay_ms
                    );
                    return sleep_or_cancel(policy.settle_delay(), cancel).await;
                }
            }
            Err(e) if e.is_transient() && consecutive_errors < policy.max_consecutive_errors => {
                consecutive_errors += 1;
                if let AppError::RateLimited {
                    retry_after_secs: Some(secs),
                } = e
                {
                    wait = wait.max(Duration::from_secs(secs));
                }
                info!(
                    "[BULK-POLL] Batch {} status query failed ({}/{}): {}",
                    redact_id(&current.id),
                    consecutive_errors,
                    policy.max_consecutive_errors,
                    e.safe_message()
                );
            }
            Err(e) => return Err(e),
        }

        sleep_or_cancel(wait, cancel).await?;
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), AppError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
