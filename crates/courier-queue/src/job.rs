//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::policy::FailureTolerance;

/// Job Identifier
pub type JobId = Uuid;

/// Most recent per-recipient failures kept on a job record.
pub const MAX_RECORDED_ERRORS: usize = 50;

/// Wire-level job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, no recipient picked up yet
    Pending,
    /// Recipients are being delivered
    Processing,
    /// Every recipient has an outcome and failures stayed within tolerance
    Completed,
    /// Every recipient has an outcome and failures exceeded tolerance
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery counters, only meaningful once processing has started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub sent: u32,
    pub failed: u32,
}

impl Progress {
    pub fn settled(&self) -> u32 {
        self.sent + self.failed
    }
}

/// Job state machine: `Pending -> Processing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing(Progress),
    Completed(Progress),
    Failed(Progress),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Processing(_) => JobStatus::Processing,
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
        }
    }

    /// Counters, or `None` while the job is still pending.
    pub fn progress(&self) -> Option<Progress> {
        match self {
            Self::Pending => None,
            Self::Processing(p) | Self::Completed(p) | Self::Failed(p) => Some(*p),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Ordinal used to assert forward-only transitions.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing(_) => 1,
            Self::Completed(_) | Self::Failed(_) => 2,
        }
    }
}

/// Message content shared read-only by every recipient send of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub from: String,
    pub subject: String,
    pub body: String,
    /// Opaque reference to an attachment (e.g. a tailored resume id)
    pub attachment_ref: Option<String>,
}

/// A job record as held by a store
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    pub recipients: Arc<[String]>,
    pub payload: Arc<MessagePayload>,
    pub tolerance: FailureTolerance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl JobRecord {
    /// New pending job with a fresh random id.
    pub fn new(
        recipients: Arc<[String]>,
        payload: Arc<MessagePayload>,
        tolerance: FailureTolerance,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: JobState::Pending,
            recipients,
            payload,
            tolerance,
            created_at: now,
            updated_at: now,
            errors: Vec::new(),
        }
    }

    pub fn total_recipients(&self) -> u32 {
        u32::try_from(self.recipients.len()).unwrap_or(u32::MAX)
    }

    /// Refresh `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn push_error(&mut self, recipient: &str, reason: &str) {
        if self.errors.len() == MAX_RECORDED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(format!("{}: {}", recipient, reason));
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            state: self.state,
            total_recipients: self.total_recipients(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            errors: self.errors.clone(),
        }
    }
}

/// Point-in-time copy of a job, detached from the store
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub total_recipients: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn sent_count(&self) -> u32 {
        self.state.progress().map(|p| p.sent).unwrap_or(0)
    }

    pub fn failed_count(&self) -> Option<u32> {
        self.state.progress().map(|p| p.failed)
    }

    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.sent_count(), self.total_recipients)
    }
}

/// `round(100 * sent / total)`, 0 for an empty job.
pub fn progress_percent(sent: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * f64::from(sent) / f64::from(total)).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Status view served to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    #[schema(value_type = String)]
    pub job_id: JobId,
    pub status: JobStatus,
    pub sent_count: u32,
    /// Absent while the job is still pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<u32>,
    pub total_recipients: u32,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl From<&JobSnapshot> for JobStatusView {
    fn from(snapshot: &JobSnapshot) -> Self {
        Self {
            job_id: snapshot.id,
            status: snapshot.status(),
            sent_count: snapshot.sent_count(),
            failed_count: snapshot.failed_count(),
            total_recipients: snapshot.total_recipients,
            progress_percent: snapshot.progress_percent(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            errors: snapshot.errors.clone(),
        }
    }
}

impl JobStatusView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
