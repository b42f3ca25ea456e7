//! Salesforce Bulk API (v1, "async" resources) client.
//!
//! This module provides functionality to:
//! - Create, close, abort and read jobs
//! - Upload JSON or CSV batch bodies
//! - Read batch state
//! - Download and decode per-record batch results
//!
//! # Security
//!
//! - Record contents are never logged
//! - The session header is marked sensitive and never logged
//! - Only HTTP method, path, status code and latency are logged

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::bulk::codec::decode_results;
use crate::bulk::results::RecordResult;
use crate::config::BulkConfig;
use crate::error::AppError;
use crate::salesforce::client::{
    build_http_client, redact_id, sanitize_url_for_logs, OrgCredentials,
};
use crate::salesforce::types::UpdateJobStateRequest;
use crate::salesforce::{BatchInfo, ContentType, CreateJobRequest, JobInfo, JobState};

/// Header carrying the session id on every async API request.
const SESSION_HEADER: &str = "X-SFDC-Session";

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Async API error response format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsyncApiError {
    exception_code: String,
    exception_message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkV1Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Bulk API job/batch resources.
#[derive(Clone)]
pub struct BulkV1Client {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Base instance URL (e.g., "https://na1.salesforce.com").
    base_url: Url,
    /// Session id for authentication.
    access_token: Arc<SecretString>,
    /// API version in resource paths, without the leading "v" (e.g., "60.0").
    api_version: String,
}

impl BulkV1Client {
    /// Creates a client over an existing HTTP client.
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - Credentials are empty
    /// - `AppError::Config` - Instance URL does not parse
    pub fn new(
        http: reqwest::Client,
        creds: &OrgCredentials,
        api_version: impl Into<String>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            http,
            base_url: creds.base_url()?,
            access_token: Arc::new(creds.access_token.clone()),
            api_version: api_version.into(),
        })
    }

    /// Creates a client with its own HTTP client built from `config`.
    pub fn from_config(creds: &OrgCredentials, config: &BulkConfig) -> Result<Self, AppError> {
        config.validate()?;
        let http = build_http_client(config.request_timeout())?;
        Self::new(http, creds, config.api_version.clone())
    }

    /// Creates a new job.
    ///
    /// # Errors
    ///
    /// - `AppError::RemoteRejected` - Unknown object, bad operation, no permission
    /// - `AppError::RateLimited` - Rate limit exceeded
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn create_job(&self, req: CreateJobRequest) -> Result<JobInfo, AppError> {
        let url = self.build_url("job")?;
        let body = serde_json::to_vec(&req)
            .map_err(|e| AppError::Internal(format!("Failed to serialize job request: {}", e)))?;

        info!(
            "[BULK-API] creating {} job for {}",
            req.operation.as_str(),
            req.object
        );

        let response = self
            .send(Method::POST, url, Some(("application/json", body)))
            .await?;
        read_json(response, "job creation").await
    }

    /// Closes a job; Salesforce keeps processing already-submitted batches.
    pub async fn close_job(&self, job_id: &str) -> Result<JobInfo, AppError> {
        self.update_job_state(job_id, JobState::Closed).await
    }

    /// Aborts a job; batches not yet processed become NotProcessed.
    pub async fn abort_job(&self, job_id: &str) -> Result<JobInfo, AppError> {
        self.update_job_state(job_id, JobState::Aborted).await
    }

    /// Gets the current state of a job.
    pub async fn get_job(&self, job_id: &str) -> Result<JobInfo, AppError> {
        let url = self.build_url(&format!("job/{}", job_id))?;
        let response = self.send(Method::GET, url, None).await?;
        read_json(response, "job status").await
    }

    /// Uploads one batch body to an open job.
    ///
    /// # Errors
    ///
    /// - `AppError::RemoteRejected` - Job closed remotely, malformed body
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn submit_batch(
        &self,
        job_id: &str,
        content_type: ContentType,
        body: Vec<u8>,
    ) -> Result<BatchInfo, AppError> {
        let url = self.build_url(&format!("job/{}/batch", job_id))?;

        info!(
            "[BULK-API] uploading batch to job {} ({} bytes)",
            redact_id(job_id),
            body.len()
        );

        let response = self
            .send(Method::POST, url, Some((content_type.mime(), body)))
            .await?;
        read_json(response, "batch creation").await
    }

    /// Gets the current state of a batch.
    pub async fn get_batch(&self, job_id: &str, batch_id: &str) -> Result<BatchInfo, AppError> {
        let url = self.build_url(&format!("job/{}/batch/{}", job_id, batch_id))?;
        let response = self.send(Method::GET, url, None).await?;
        read_json(response, "batch status").await
    }

    /// Downloads and decodes a batch's per-record results.
    pub async fn get_batch_result(
        &self,
        job_id: &str,
        batch_id: &str,
        content_type: ContentType,
    ) -> Result<Vec<RecordResult>, AppError> {
        let url = self.build_url(&format!("job/{}/batch/{}/result", job_id, batch_id))?;
        let response = self.send(Method::GET, url, None).await?;

        let bytes = response.bytes().await.map_err(|_| {
            AppError::ConnectionFailed("Error reading batch result body".to_string())
        })?;

        let results = decode_results(&bytes, content_type)?;
        info!(
            "[BULK-API] batch {} result: {} records",
            redact_id(batch_id),
            results.len()
        );
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn update_job_state(&self, job_id: &str, state: JobState) -> Result<JobInfo, AppError> {
        let url = self.build_url(&format!("job/{}", job_id))?;
        let body = serde_json::to_vec(&UpdateJobStateRequest { state })
            .map_err(|e| AppError::Internal(format!("Failed to serialize job state: {}", e)))?;

        info!(
            "[BULK-API] setting job {} to {}",
            redact_id(job_id),
            state.as_str()
        );

        let response = self
            .send(Method::POST, url, Some(("application/json", body)))
            .await?;
        read_json(response, "job state change").await
    }

    /// Sends one authenticated request with timing and safe logging.
    ///
    /// Non-success statuses are mapped to `AppError` here, so callers only
    /// ever see successful responses.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url);

        let mut session = HeaderValue::from_str(self.access_token.expose_secret())
            .map_err(|_| AppError::NotAuthenticated)?;
        session.set_sensitive(true);

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(SESSION_HEADER, session);

        if let Some((content_type, bytes)) = body {
            request = request.header(CONTENT_TYPE, content_type).body(bytes);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                info!(
                    "[BULK-API] {} {} {} {}ms",
                    method,
                    sanitized_url,
                    status.as_u16(),
                    duration_ms
                );

                if !status.is_success() {
                    return Err(parse_error_response(response, status).await);
                }
                Ok(response)
            }
            Err(e) => {
                // The raw reqwest error can carry the full URL; keep it out of the message.
                info!(
                    "[BULK-API] {} {} FAILED {}ms",
                    method, sanitized_url, duration_ms
                );
                let reason = if e.is_timeout() {
                    "Request to Salesforce timed out"
                } else {
                    "Connection to Salesforce failed"
                };
                Err(AppError::ConnectionFailed(reason.to_string()))
            }
        }
    }

    /// Builds `/services/async/{version}/{tail}` against the instance URL.
    fn build_url(&self, tail: &str) -> Result<Url, AppError> {
        let path = format!("/services/async/{}/{}", self.api_version, tail);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build URL: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to parse {} response: {}", what, e)))
}

/// Maps an error response to the matching `AppError`.
async fn parse_error_response(response: reqwest::Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::UNAUTHORIZED {
        return AppError::SessionExpired;
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound("Bulk job or batch not found".to_string());
    }

    if status.is_server_error() {
        return AppError::ConnectionFailed(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Server error")
        ));
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    if let Ok(error) = serde_json::from_str::<AsyncApiError>(&body) {
        return match error.exception_code.as_str() {
            "InvalidSessionId" => AppError::SessionExpired,
            "ExceededQuota" => AppError::RateLimited {
                retry_after_secs: None,
            },
            _ => AppError::RemoteRejected {
                code: error.exception_code,
                message: error.exception_message,
            },
        };
    }

    AppError::RemoteRejected {
        code: format!("HTTP_{}", status.as_u16()),
        message: status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
