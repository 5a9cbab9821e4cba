//! Cancellable poller following one bulk job to its end
//!
//! The poller asks for the job's status immediately and then once per
//! interval. It stops for good as soon as it sees `COMPLETED` or `FAILED`,
//! when the job turns out not to exist, after too many consecutive fetch
//! errors, or when its [`PollHandle`] is cancelled or dropped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use courier_queue::job::progress_percent;
use courier_queue::{JobId, JobStatusView};

use crate::client::CourierClient;
use crate::error::ClientError;

/// Anything that can report a job's status
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, job_id: JobId) -> Result<JobStatusView, ClientError>;
}

#[async_trait]
impl StatusSource for CourierClient {
    async fn fetch(&self, job_id: JobId) -> Result<JobStatusView, ClientError> {
        self.job_status(job_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Fetch errors in a row tolerated before giving up
    pub max_consecutive_errors: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_consecutive_errors: 5,
        }
    }
}

/// What the poller last observed
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// No answer yet
    Started,
    Progress { view: JobStatusView, percent: u8 },
    Finished { view: JobStatusView, percent: u8 },
    Failed(ClientError),
    Cancelled,
}

impl PollEvent {
    /// No further events follow a final one
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PollEvent::Finished { .. } | PollEvent::Failed(_) | PollEvent::Cancelled
        )
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            PollEvent::Progress { percent, .. } | PollEvent::Finished { percent, .. } => {
                Some(*percent)
            }
            _ => None,
        }
    }

    pub fn view(&self) -> Option<&JobStatusView> {
        match self {
            PollEvent::Progress { view, .. } | PollEvent::Finished { view, .. } => Some(view),
            _ => None,
        }
    }
}

pub struct Poller;

impl Poller {
    /// Start polling `job_id` in the background.
    pub fn start(
        source: Arc<dyn StatusSource>,
        job_id: JobId,
        config: PollerConfig,
    ) -> PollHandle {
        let (tx, rx) = watch::channel(PollEvent::Started);
        let tx = Arc::new(tx);
        let task = tokio::spawn(poll_loop(source, job_id, config, tx.clone()));
        PollHandle { tx, rx, task }
    }
}

/// Owner of a running poller. Dropping it stops the poller.
pub struct PollHandle {
    tx: Arc<watch::Sender<PollEvent>>,
    rx: watch::Receiver<PollEvent>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Latest event
    pub fn latest(&self) -> PollEvent {
        self.rx.borrow().clone()
    }

    /// Independent receiver of poll events
    pub fn subscribe(&self) -> watch::Receiver<PollEvent> {
        self.rx.clone()
    }

    /// Wait until the poller stops and return its final event.
    pub async fn finished(&mut self) -> PollEvent {
        let result = self
            .rx
            .wait_for(PollEvent::is_final)
            .await
            .map(|event| (*event).clone());
        match result {
            Ok(event) => event,
            Err(_) => self.latest(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop polling now. A poller that already finished keeps its final event.
    pub fn cancel(&self) {
        self.task.abort();
        publish(&self.tx, PollEvent::Cancelled);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Replace the current event unless a final one is already published.
fn publish(tx: &watch::Sender<PollEvent>, event: PollEvent) -> bool {
    tx.send_if_modified(|current| {
        if current.is_final() {
            return false;
        }
        *current = event;
        true
    })
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    job_id: JobId,
    config: PollerConfig,
    tx: Arc<watch::Sender<PollEvent>>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_errors = 0;

    loop {
        ticker.tick().await;

        match source.fetch(job_id).await {
            Ok(view) => {
                consecutive_errors = 0;
                let percent = progress_percent(view.sent_count, view.total_recipients);
                let terminal = view.is_terminal();
                let event = if terminal {
                    tracing::debug!(job_id = %job_id, status = %view.status, "Job reached terminal status");
                    PollEvent::Finished { view, percent }
                } else {
                    PollEvent::Progress { view, percent }
                };

                if !publish(&tx, event) || terminal {
                    return;
                }
            }
            Err(e @ ClientError::NotFound(_)) => {
                publish(&tx, PollEvent::Failed(e));
                return;
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(
                    job_id = %job_id,
                    attempt = consecutive_errors,
                    error = %e,
                    "Status poll failed"
                );
                if consecutive_errors >= config.max_consecutive_errors {
                    publish(&tx, PollEvent::Failed(e));
                    return;
                }
            }
        }
    }
}
