//! Job Store Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::job::{JobId, JobRecord, JobSnapshot, JobState, JobStatus, Progress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Job {0} already exists")]
    AlreadyExists(JobId),
    #[error("Job {0} is already finished")]
    Finished(JobId),
    #[error("Job {0} has not started processing")]
    NotStarted(JobId),
}

/// Final result for one recipient of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientOutcome {
    Sent,
    Failed(String),
}

/// Keyed storage of job records.
///
/// Every mutating call must apply its transition atomically with respect to
/// other calls on the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job
    async fn create(&self, job: JobRecord) -> Result<JobSnapshot, QueueError>;

    /// `Pending -> Processing`; a no-op for a job already processing
    async fn mark_processing(&self, id: JobId) -> Result<JobSnapshot, QueueError>;

    /// Count one recipient outcome, settling the job when it is the last one
    async fn record_outcome(
        &self,
        id: JobId,
        recipient: &str,
        outcome: &RecipientOutcome,
    ) -> Result<JobSnapshot, QueueError>;

    /// Point-in-time snapshot of a job
    async fn get(&self, id: JobId) -> Result<JobSnapshot, QueueError>;

    /// Number of stored jobs per status
    async fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>, QueueError>;

    /// Drop terminal jobs last updated before `cutoff`, returning how many went
    async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError>;
}

impl JobRecord {
    /// Apply `Pending -> Processing`.
    pub fn begin_processing(&mut self) -> Result<(), QueueError> {
        match self.state {
            JobState::Pending => {
                self.state = JobState::Processing(Progress::default());
                self.touch();
                Ok(())
            }
            JobState::Processing(_) => Ok(()),
            JobState::Completed(_) | JobState::Failed(_) => Err(QueueError::Finished(self.id)),
        }
    }

    /// Count one outcome and, once every recipient is settled, move to the
    /// terminal state chosen by the job's failure tolerance.
    ///
    /// Only a processing job accepts outcomes.
    pub fn apply_outcome(
        &mut self,
        recipient: &str,
        outcome: &RecipientOutcome,
    ) -> Result<(), QueueError> {
        let mut progress = match self.state {
            JobState::Pending => return Err(QueueError::NotStarted(self.id)),
            JobState::Processing(p) => p,
            JobState::Completed(_) | JobState::Failed(_) => {
                return Err(QueueError::Finished(self.id))
            }
        };

        let total = self.total_recipients();
        if progress.settled() >= total {
            return Err(QueueError::Finished(self.id));
        }

        match outcome {
            RecipientOutcome::Sent => progress.sent += 1,
            RecipientOutcome::Failed(reason) => {
                progress.failed += 1;
                self.push_error(recipient, reason);
            }
        }

        self.state = if progress.settled() == total {
            self.tolerance.verdict(progress, total)
        } else {
            JobState::Processing(progress)
        };
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MessagePayload;
    use crate::policy::FailureTolerance;
    use std::sync::Arc;

    fn record(n: usize, tolerance: FailureTolerance) -> JobRecord {
        let recipients: Vec<String> = (0..n).map(|i| format!("r{}@example.com", i)).collect();
        JobRecord::new(
            recipients.into(),
            Arc::new(MessagePayload {
                from: "me@example.com".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
                attachment_ref: None,
            }),
            tolerance,
        )
    }

    #[test]
    fn test_settles_exactly_once() {
        let mut job = record(2, FailureTolerance::default());
        job.begin_processing().unwrap();
        job.apply_outcome("r0@example.com", &RecipientOutcome::Sent).unwrap();
        assert_eq!(job.state.status(), JobStatus::Processing);
        job.apply_outcome("r1@example.com", &RecipientOutcome::Sent).unwrap();
        assert_eq!(job.state, JobState::Completed(Progress { sent: 2, failed: 0 }));

        let err = job
            .apply_outcome("r1@example.com", &RecipientOutcome::Sent)
            .unwrap_err();
        assert_eq!(err, QueueError::Finished(job.id));
        assert_eq!(job.state, JobState::Completed(Progress { sent: 2, failed: 0 }));
    }

    #[test]
    fn test_failures_are_logged() {
        let mut job = record(1, FailureTolerance::None);
        job.begin_processing().unwrap();
        job.apply_outcome("r0@example.com", &RecipientOutcome::Failed("550 unknown".into()))
            .unwrap();
        assert_eq!(job.state, JobState::Failed(Progress { sent: 0, failed: 1 }));
        assert_eq!(job.errors, vec!["r0@example.com: 550 unknown"]);
    }

    #[test]
    fn test_terminal_job_cannot_restart() {
        let mut job = record(1, FailureTolerance::default());
        job.begin_processing().unwrap();
        job.apply_outcome("r0@example.com", &RecipientOutcome::Sent).unwrap();
        assert!(job.begin_processing().is_err());
    }

    #[test]
    fn test_pending_job_rejects_outcomes() {
        let mut job = record(1, FailureTolerance::default());
        let err = job
            .apply_outcome("r0@example.com", &RecipientOutcome::Sent)
            .unwrap_err();
        assert_eq!(err, QueueError::NotStarted(job.id));
        assert_eq!(job.state, JobState::Pending);
        assert!(job.errors.is_empty());
    }
}
