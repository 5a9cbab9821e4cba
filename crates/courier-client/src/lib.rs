//! # Courier Client
//!
//! Typed access to the Courier HTTP API and a poller that follows a bulk
//! job until it finishes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier_client::{CourierClient, Poller, PollerConfig, SendEmail, SendOutcome};
//!
//! # async fn demo() -> Result<(), courier_client::ClientError> {
//! let client = Arc::new(CourierClient::new("http://localhost:8080"));
//! let outcome = client
//!     .send_email(&SendEmail::new("me@example.com", ["a@example.com", "b@example.com"], "Hi", "Hello"))
//!     .await?;
//!
//! if let SendOutcome::Queued(job) = outcome {
//!     let mut handle = Poller::start(client, job.job_id, PollerConfig::default());
//!     let last = handle.finished().await;
//!     println!("{:?}", last);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod poller;

pub use client::{CourierClient, JobAccepted, SendEmail, SendOutcome, SentReceipt};
pub use error::ClientError;
pub use poller::{PollEvent, PollHandle, Poller, PollerConfig, StatusSource};

pub use courier_queue::{JobId, JobStatus, JobStatusView};
