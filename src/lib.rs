//! Salesforce Bulk API job orchestration.
//!
//! Submit record containers as batches of one job, poll them with backoff and
//! collect per-record results in submission order.
//!
//! ```no_run
//! use stampede_bulk::{
//!     BulkConfig, BulkOperation, BulkOrchestrator, BulkV1Client, OrgCredentials, RecordList,
//!     SObject,
//! };
//!
//! # async fn run() -> Result<(), stampede_bulk::AppError> {
//! let config = BulkConfig::from_env()?;
//! let creds = OrgCredentials::new("https://na1.salesforce.com", "00D...session");
//! let client = BulkV1Client::from_config(&creds, &config)?;
//! let orchestrator = BulkOrchestrator::new(client, &config)?;
//!
//! let accounts: RecordList<SObject> = vec![SObject::new().with("Name", "Acme")].into();
//! let report = orchestrator
//!     .run_job_and_poll("Account", BulkOperation::Insert, vec![accounts])
//!     .await?;
//!
//! for set in report.result_sets()? {
//!     for record in set.iter() {
//!         println!("{:?} created={} success={}", record.id, record.created, record.success);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod salesforce;

pub use bulk::{
    BulkApi, BulkOrchestrator, Interruption, JobRunReport, JobSpec, Record, RecordList,
    RecordResult, ResultSet, SObject,
};
pub use config::{BulkConfig, PollPolicy};
pub use error::AppError;
pub use salesforce::{BulkOperation, BulkV1Client, ContentType, OrgCredentials};
