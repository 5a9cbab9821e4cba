//! # Courier Queue
//!
//! Bulk mail jobs with bounded background delivery.
//!
//! Features:
//! - Recipient expansion (split, dedupe, sender exclusion, validation)
//! - Admission routing between inline sends and background jobs
//! - Pluggable job store and mail transport
//! - Worker pool with a global in-flight limit
//! - Per-recipient retry with jittered exponential backoff
//! - Failure tolerance deciding `COMPLETED` vs `FAILED`

pub mod admission;
pub mod backend;
pub mod job;
pub mod memory;
pub mod mock;
pub mod policy;
pub mod recipients;
#[cfg(feature = "smtp")]
pub mod smtp;
pub mod status;
pub mod transport;
pub mod worker;

pub use admission::{
    Admission, AdmissionConfig, AdmissionError, AdmissionRouter, QueuedJob, SendRequest,
    SentReceipt,
};
pub use backend::{JobStore, QueueError, RecipientOutcome};
pub use job::{JobId, JobRecord, JobSnapshot, JobState, JobStatus, JobStatusView, Progress};
pub use memory::MemoryJobStore;
pub use mock::MockTransport;
pub use policy::{BackoffStrategy, FailureTolerance, RetryPolicy};
pub use recipients::{RecipientError, RecipientExpander};
#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpTransport};
pub use status::{parse_job_id, StatusService};
pub use transport::{ConsoleTransport, Delivery, MailTransport, OutboundMessage, TransportError};
pub use worker::{DispatchOrder, WorkerConfig, WorkerPool};
