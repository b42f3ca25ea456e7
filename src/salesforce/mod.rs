//! Salesforce Bulk API interaction layer.
//!
//! - **Wire types** for jobs, batches and batch results
//! - **Safe logging** that never leaks session ids or record contents
//! - **Secure credential handling** via `secrecy::SecretString`

pub mod bulk_v1;
pub mod client;
pub mod types;

pub use bulk_v1::BulkV1Client;
pub use client::{build_http_client, OrgCredentials};
pub use types::{
    BatchInfo, BatchResultRow, BatchState, BulkOperation, ConcurrencyMode, ContentType,
    CreateJobRequest, JobInfo, JobState, ResultError,
};
