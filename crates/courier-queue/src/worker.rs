//! Worker pool delivering the recipients of bulk jobs

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::backend::{JobStore, RecipientOutcome};
use crate::job::{JobId, MessagePayload};
use crate::policy::RetryPolicy;
use crate::transport::{Delivery, MailTransport, OutboundMessage, TransportError};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Sends in flight across every job handled by the pool
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    /// Add the sender as a second `To` on every message
    pub copy_sender: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 5,
            retry: RetryPolicy::default(),
            copy_sender: true,
        }
    }
}

/// Work handed to the pool for one job
#[derive(Debug, Clone)]
pub struct DispatchOrder {
    pub job_id: JobId,
    pub recipients: Arc<[String]>,
    pub payload: Arc<MessagePayload>,
}

pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn MailTransport>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn MailTransport>,
        config: WorkerConfig,
    ) -> Self {
        info!(
            "Worker pool created with {} concurrent sends via {} transport",
            config.max_in_flight,
            transport.name()
        );
        Self {
            store,
            transport,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn MailTransport> {
        self.transport.clone()
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out send slots. Recipients still waiting for a slot are
    /// recorded as failed; sends already in flight finish normally.
    pub fn shutdown(&self) {
        if !self.permits.is_closed() {
            warn!("Worker pool shutting down");
            self.permits.close();
        }
    }

    /// Run `order` in the background.
    pub fn spawn(self: &Arc<Self>, order: DispatchOrder) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move { pool.run(order).await })
    }

    /// Deliver every recipient of a job and settle it.
    pub async fn run(&self, order: DispatchOrder) {
        let job_id = order.job_id;

        if let Err(e) = self.store.mark_processing(job_id).await {
            error!(job_id = %job_id, error = %e, "Could not start job");
            return;
        }

        info!(
            job_id = %job_id,
            total = order.recipients.len(),
            "Processing job"
        );

        let mut tasks = JoinSet::new();
        for recipient in order.recipients.iter() {
            let message =
                OutboundMessage::for_recipient(&order.payload, recipient, self.config.copy_sender);
            let recipient = recipient.clone();
            let store = self.store.clone();
            let transport = self.transport.clone();
            let permits = self.permits.clone();
            let retry = self.config.retry;

            tasks.spawn(async move {
                let attempt =
                    send_with_retry(transport.as_ref(), &message, &retry, Some(permits.as_ref()));
                let result = AssertUnwindSafe(attempt)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(TransportError::Rejected("delivery task panicked".to_string()))
                    });

                let outcome = match result {
                    Ok(_) => RecipientOutcome::Sent,
                    Err(e) => RecipientOutcome::Failed(e.to_string()),
                };
                settle(store.as_ref(), job_id, &recipient, outcome).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(job_id = %job_id, error = %e, "Recipient task aborted");
            }
        }
    }
}

async fn settle(store: &dyn JobStore, job_id: JobId, recipient: &str, outcome: RecipientOutcome) {
    if let RecipientOutcome::Failed(reason) = &outcome {
        warn!(job_id = %job_id, recipient = %recipient, reason = %reason, "Recipient failed");
    }

    match store.record_outcome(job_id, recipient, &outcome).await {
        Ok(snapshot) if snapshot.state.is_terminal() => {
            info!(
                job_id = %job_id,
                status = %snapshot.status(),
                sent = snapshot.sent_count(),
                failed = snapshot.failed_count().unwrap_or(0),
                total = snapshot.total_recipients,
                "Job finished"
            );
        }
        Ok(snapshot) => {
            debug!(
                job_id = %job_id,
                recipient = %recipient,
                sent = snapshot.sent_count(),
                failed = snapshot.failed_count().unwrap_or(0),
                "Recipient settled"
            );
        }
        Err(e) => {
            error!(job_id = %job_id, recipient = %recipient, error = %e, "Failed to record outcome");
        }
    }
}

/// Send `message`, retrying transient failures under `retry`.
///
/// Every attempt is bounded by `retry.send_timeout`; a timeout counts as a
/// transient failure. When `permits` is given, a slot is held only for the
/// duration of each attempt, never across a backoff sleep.
pub async fn send_with_retry(
    transport: &dyn MailTransport,
    message: &OutboundMessage,
    retry: &RetryPolicy,
    permits: Option<&Semaphore>,
) -> Result<Delivery, TransportError> {
    let recipient = message.primary_recipient();
    let mut attempts = 0;

    loop {
        let permit = match permits {
            Some(semaphore) => match semaphore.acquire().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    return Err(TransportError::Unavailable(
                        "dispatcher shut down".to_string(),
                    ))
                }
            },
            None => None,
        };

        attempts += 1;
        let result = tokio::time::timeout(retry.send_timeout, transport.send(message))
            .await
            .unwrap_or(Err(TransportError::Timeout));
        drop(permit);

        match result {
            Ok(delivery) => {
                debug!(recipient = %recipient, attempts, "Message accepted");
                return Ok(delivery);
            }
            Err(e) if e.is_transient() && retry.should_retry(attempts) => {
                let delay = retry.delay_after(attempts);
                info!(
                    recipient = %recipient,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient send failure, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
