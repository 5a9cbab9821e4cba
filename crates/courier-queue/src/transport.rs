//! Mail transport trait and common types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::MessagePayload;

/// Errors from a mail transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
    #[error("Send timed out")]
    Timeout,
    #[error("Rejected by transport: {0}")]
    Rejected(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl TransportError {
    /// Transient errors are worth another attempt; the rest are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// One message to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment_ref: Option<String>,
}

impl OutboundMessage {
    /// Message for one recipient, with the sender copied in when asked.
    pub fn for_recipient(payload: &MessagePayload, recipient: &str, copy_sender: bool) -> Self {
        Self::for_recipients(payload, &[recipient], copy_sender)
    }

    /// Single message addressed to every recipient at once.
    pub fn for_recipients<S: AsRef<str>>(
        payload: &MessagePayload,
        recipients: &[S],
        copy_sender: bool,
    ) -> Self {
        let mut to: Vec<String> = recipients.iter().map(|r| r.as_ref().to_string()).collect();
        if copy_sender && !to.iter().any(|r| r.eq_ignore_ascii_case(&payload.from)) {
            to.push(payload.from.clone());
        }
        Self {
            from: payload.from.clone(),
            to,
            subject: payload.subject.clone(),
            body: payload.body.clone(),
            attachment_ref: payload.attachment_ref.clone(),
        }
    }

    /// The recipient the message is primarily addressed to.
    pub fn primary_recipient(&self) -> &str {
        self.to.first().map(String::as_str).unwrap_or_default()
    }
}

/// Confirmation returned by a transport for an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

impl Delivery {
    pub fn accepted(message_id: Option<String>) -> Self {
        Self {
            message_id,
            accepted_at: Utc::now(),
        }
    }
}

/// Sends a single message
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Transport name, for logs
    fn name(&self) -> &str;

    /// Deliver one message
    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError>;
}

/// Transport that only logs, used when no real relay is configured
#[derive(Debug, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl MailTransport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        let message_id = format!("<{}@courier.local>", uuid::Uuid::new_v4());
        tracing::info!(
            from = %message.from,
            to = %message.to.join(","),
            subject = %message.subject,
            body_len = message.body.len(),
            message_id = %message_id,
            "Console transport accepted message"
        );
        Ok(Delivery::accepted(Some(message_id)))
    }
}
