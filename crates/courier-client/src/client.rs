//! HTTP client for the Courier API

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use courier_queue::{JobId, JobStatus, JobStatusView};

use crate::error::ClientError;

/// Body of `POST /api/send-email`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tailored_resume_id: Option<String>,
}

impl SendEmail {
    pub fn new<I, S>(from: &str, to: I, subject: &str, body: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.to_string(),
            to: to.into_iter().map(Into::into).collect(),
            subject: subject.to_string(),
            body: body.to_string(),
            tailored_resume_id: None,
        }
    }

    pub fn with_resume(mut self, resume_id: &str) -> Self {
        self.tailored_resume_id = Some(resume_id.to_string());
        self
    }
}

/// Confirmation of an inline send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentReceipt {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

/// Acknowledgement of a bulk send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total_recipients: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(SentReceipt),
    Queued(JobAccepted),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Client for one Courier server
#[derive(Debug, Clone)]
pub struct CourierClient {
    base_url: String,
    client: reqwest::Client,
}

impl CourierClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a message; bulk sends come back as a job to poll.
    pub async fn send_email(&self, request: &SendEmail) -> Result<SendOutcome, ClientError> {
        let url = format!("{}/api/send-email", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        match response.status() {
            StatusCode::OK => Ok(SendOutcome::Delivered(response.json().await?)),
            StatusCode::ACCEPTED => {
                let accepted: JobAccepted = response.json().await?;
                tracing::debug!(job_id = %accepted.job_id, total = accepted.total_recipients, "Bulk send queued");
                Ok(SendOutcome::Queued(accepted))
            }
            _ => Err(error_from(response).await),
        }
    }

    /// Current status of a bulk job
    pub async fn job_status(&self, job_id: JobId) -> Result<JobStatusView, ClientError> {
        let url = format!("{}/api/send-email/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(job_id.to_string())),
            _ => Err(error_from(response).await),
        }
    }
}

async fn error_from(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => ClientError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: "UNKNOWN".to_string(),
            message: text,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let req = SendEmail::new("me@example.com", ["a@example.com"], "Hi", "Body")
            .with_resume("resume-1");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tailoredResumeId"], "resume-1");
        assert_eq!(json["to"][0], "a@example.com");

        let json = serde_json::to_value(SendEmail::new("me@example.com", ["a@example.com"], "Hi", ""))
            .unwrap();
        assert!(json.get("tailoredResumeId").is_none());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = CourierClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
