//! Tunables for the bulk client and the batch poller.
//!
//! Every field has a default; a JSON document or `STAMPEDE_BULK_*` environment
//! variables may override any subset of them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::salesforce::ContentType;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk API version used in resource paths.
pub const DEFAULT_API_VERSION: &str = "60.0";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of batches driven concurrently by one orchestration.
const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 10;

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "STAMPEDE_BULK_";

// ─────────────────────────────────────────────────────────────────────────────
// PollPolicy
// ─────────────────────────────────────────────────────────────────────────────

/// Polling cadence for batches.
///
/// The wait between status queries starts at `initial_interval_ms` and is
/// multiplied by `growth_factor` after every non-terminal poll, capped at
/// `max_interval_ms` when set. Once a batch is terminal the poller waits
/// `settle_delay_ms` once before results are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub initial_interval_ms: u64,
    pub growth_factor: f64,
    pub max_interval_ms: Option<u64>,
    pub settle_delay_ms: u64,
    /// Consecutive transient status-query failures tolerated per batch.
    pub max_consecutive_errors: u32,
    /// Overall budget for one orchestration, measured from job creation.
    pub deadline_ms: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            growth_factor: 2.0,
            max_interval_ms: Some(30_000),
            settle_delay_ms: 4_000,
            max_consecutive_errors: 5,
            deadline_ms: None,
        }
    }
}

impl PollPolicy {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Option<Duration> {
        self.max_interval_ms.map(Duration::from_millis)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Checks the policy for values that would busy-poll or shrink intervals.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.initial_interval_ms == 0 {
            return Err(AppError::Config(
                "initial_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(AppError::Config(format!(
                "growth_factor must be at least 1.0, got {}",
                self.growth_factor
            )));
        }
        if let Some(max) = self.max_interval_ms {
            if max < self.initial_interval_ms {
                return Err(AppError::Config(format!(
                    "max_interval_ms ({}) is below initial_interval_ms ({})",
                    max, self.initial_interval_ms
                )));
            }
        }
        if self.deadline_ms == Some(0) {
            return Err(AppError::Config(
                "deadline_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Client-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub api_version: String,
    pub content_type: ContentType,
    pub request_timeout_secs: u64,
    pub max_concurrent_batches: usize,
    pub poll: PollPolicy,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            content_type: ContentType::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            poll: PollPolicy::default(),
        }
    }
}

impl BulkConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let config: BulkConfig = serde_json::from_str(json)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `STAMPEDE_BULK_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = BulkConfig::default();

        if let Some(v) = get("API_VERSION") {
            config.api_version = v.trim_start_matches('v').to_string();
        }
        if let Some(v) = get("CONTENT_TYPE") {
            config.content_type = match v.to_ascii_uppercase().as_str() {
                "JSON" => ContentType::Json,
                "CSV" => ContentType::Csv,
                other => {
                    return Err(AppError::Config(format!(
                        "Unsupported content type: {}",
                        other
                    )))
                }
            };
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENT_BATCHES") {
            config.max_concurrent_batches = parse_var("MAX_CONCURRENT_BATCHES", &v)?;
        }
        if let Some(v) = get("POLL_INITIAL_MS") {
            config.poll.initial_interval_ms = parse_var("POLL_INITIAL_MS", &v)?;
        }
        if let Some(v) = get("POLL_GROWTH_FACTOR") {
            config.poll.growth_factor = parse_var("POLL_GROWTH_FACTOR", &v)?;
        }
        if let Some(v) = get("POLL_MAX_MS") {
            // "none" lifts the cap.
            config.poll.max_interval_ms = if v.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_var("POLL_MAX_MS", &v)?)
            };
        }
        if let Some(v) = get("SETTLE_DELAY_MS") {
            config.poll.settle_delay_ms = parse_var("SETTLE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAX_POLL_ERRORS") {
            config.poll.max_consecutive_errors = parse_var("MAX_POLL_ERRORS", &v)?;
        }
        if let Some(v) = get("DEADLINE_MS") {
            config.poll.deadline_ms = Some(parse_var("DEADLINE_MS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.api_version.is_empty() {
            return Err(AppError::Config("api_version must not be empty".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(AppError::Config(
                "max_concurrent_batches must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.poll.validate()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value))
    })
}
