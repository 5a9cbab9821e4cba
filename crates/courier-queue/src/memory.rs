//! In-memory job store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::{JobStore, QueueError, RecipientOutcome};
use crate::job::{JobId, JobRecord, JobSnapshot, JobStatus};

/// Job records keyed by id behind a single reader/writer lock.
///
/// Outcomes are applied under the write lock, so the increment and the
/// terminal check of one outcome never interleave with another's.
#[derive(Debug, Default, Clone)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: JobRecord) -> Result<JobSnapshot, QueueError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::AlreadyExists(job.id));
        }
        let snapshot = job.snapshot();
        jobs.insert(job.id, job);

        tracing::debug!(
            job_id = %snapshot.id,
            total = snapshot.total_recipients,
            "Job created"
        );
        Ok(snapshot)
    }

    async fn mark_processing(&self, id: JobId) -> Result<JobSnapshot, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.begin_processing()?;
        Ok(job.snapshot())
    }

    async fn record_outcome(
        &self,
        id: JobId,
        recipient: &str,
        outcome: &RecipientOutcome,
    ) -> Result<JobSnapshot, QueueError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.apply_outcome(recipient, outcome)?;
        Ok(job.snapshot())
    }

    async fn get(&self, id: JobId) -> Result<JobSnapshot, QueueError> {
        let jobs = self.jobs.read().await;
        jobs.get(&id)
            .map(JobRecord::snapshot)
            .ok_or(QueueError::NotFound(id))
    }

    async fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>, QueueError> {
        let jobs = self.jobs.read().await;
        let mut counts = HashMap::new();
        for job in jobs.values() {
            *counts.entry(job.state.status()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at < cutoff));
        Ok(before - jobs.len())
    }
}
