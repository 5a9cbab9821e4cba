//! Admission: decide between an inline send and a background job

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::{JobStore, QueueError};
use crate::job::{JobRecord, JobSnapshot, MessagePayload};
use crate::policy::{FailureTolerance, RetryPolicy};
use crate::recipients::{is_valid_address, RecipientError, RecipientExpander};
use crate::transport::{Delivery, OutboundMessage, TransportError};
use crate::worker::{send_with_retry, DispatchOrder, WorkerPool};

/// A caller's request to send one message to a recipient list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub from: String,
    /// Raw entries, each possibly holding several separated addresses
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionConfig {
    /// Recipient counts up to this value are sent inline
    pub bulk_threshold: usize,
    pub max_recipients: usize,
    /// Captured into every job created
    pub tolerance: FailureTolerance,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            bulk_threshold: 1,
            max_recipients: 500,
            tolerance: FailureTolerance::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] RecipientError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] QueueError),
}

/// Result of an inline send
#[derive(Debug, Clone)]
pub struct SentReceipt {
    pub recipients: Vec<String>,
    pub delivery: Delivery,
}

/// A job accepted for background delivery
#[derive(Debug)]
pub struct QueuedJob {
    pub job: JobSnapshot,
    /// Completes once every recipient has been settled
    pub dispatch: JoinHandle<()>,
}

impl QueuedJob {
    /// Human-readable acknowledgement for the caller.
    pub fn message(&self) -> String {
        format!(
            "Processing bulk emails to {} recipients in background.",
            self.job.total_recipients
        )
    }
}

#[derive(Debug)]
pub enum Admission {
    Sent(SentReceipt),
    Queued(QueuedJob),
}

/// Routes validated requests to the inline path or the worker pool
pub struct AdmissionRouter {
    store: Arc<dyn JobStore>,
    pool: Arc<WorkerPool>,
    expander: RecipientExpander,
    config: AdmissionConfig,
}

impl AdmissionRouter {
    pub fn new(store: Arc<dyn JobStore>, pool: Arc<WorkerPool>, config: AdmissionConfig) -> Self {
        Self {
            store,
            pool,
            expander: RecipientExpander::new(config.max_recipients),
            config,
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Validate `request` and either send it now or hand it to the pool.
    ///
    /// Nothing is stored for an inline send; a transport error fails the
    /// whole request. A bulk request returns as soon as its job exists.
    pub async fn admit(&self, request: SendRequest) -> Result<Admission, AdmissionError> {
        let from = request.from.trim().to_string();
        if !is_valid_address(&from) {
            return Err(RecipientError::InvalidSender(request.from).into());
        }

        let recipients = self.expander.expand(&from, &request.to)?;
        let payload = Arc::new(MessagePayload {
            from,
            subject: request.subject,
            body: request.body,
            attachment_ref: request.attachment_ref,
        });

        if recipients.len() <= self.config.bulk_threshold {
            return self.send_inline(recipients, &payload).await;
        }

        let record = JobRecord::new(recipients.into(), payload, self.config.tolerance);
        let order = DispatchOrder {
            job_id: record.id,
            recipients: record.recipients.clone(),
            payload: record.payload.clone(),
        };
        let job = self.store.create(record).await?;
        let dispatch = self.pool.spawn(order);

        info!(
            job_id = %job.id,
            total = job.total_recipients,
            tolerance = ?self.config.tolerance,
            "Bulk send accepted"
        );
        Ok(Admission::Queued(QueuedJob { job, dispatch }))
    }

    async fn send_inline(
        &self,
        recipients: Vec<String>,
        payload: &MessagePayload,
    ) -> Result<Admission, AdmissionError> {
        let worker = self.pool.config();
        let message = OutboundMessage::for_recipients(payload, &recipients, worker.copy_sender);
        let retry = RetryPolicy::single_attempt(worker.retry.send_timeout);
        let transport = self.pool.transport();

        let delivery = send_with_retry(transport.as_ref(), &message, &retry, None).await?;
        info!(
            recipients = recipients.len(),
            message_id = delivery.message_id.as_deref().unwrap_or("-"),
            "Message sent inline"
        );
        Ok(Admission::Sent(SentReceipt {
            recipients,
            delivery,
        }))
    }
}
