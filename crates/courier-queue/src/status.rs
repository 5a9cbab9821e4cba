//! Read-only job status queries

use std::sync::Arc;

use crate::backend::{JobStore, QueueError};
use crate::job::{JobId, JobStatusView};

/// Serves consistent snapshots of job records to pollers
#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn JobStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Current status of `id`, or `NotFound`.
    pub async fn status(&self, id: JobId) -> Result<JobStatusView, QueueError> {
        let snapshot = self.store.get(id).await?;
        Ok(JobStatusView::from(&snapshot))
    }
}

/// Parse a job id from a path segment. Anything that is not a UUID cannot
/// name a job.
pub fn parse_job_id(raw: &str) -> Option<JobId> {
    JobId::parse_str(raw.trim()).ok()
}
