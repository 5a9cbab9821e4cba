//! SMTP relay transport backed by lettre

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::transport::{Delivery, MailTransport, OutboundMessage, TransportError};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// Delivers through a STARTTLS relay
pub struct SmtpTransport {
    relay: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| TransportError::Unavailable(e.to_string()))?
            .port(config.port)
            .timeout(Some(config.timeout));

        if let (Some(user), Some(pass)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        tracing::info!(host = %config.host, port = config.port, "SMTP transport configured");
        Ok(Self {
            relay: builder.build(),
            host: config.host,
        })
    }

    fn build_message(message: &OutboundMessage) -> Result<Message, TransportError> {
        let from: Mailbox = parse_mailbox(&message.from)?;
        let mut builder = Message::builder()
            .from(from)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML);
        for to in &message.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        builder
            .body(message.body.clone())
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse()
        .map_err(|_| TransportError::InvalidAddress(address.to_string()))
}

fn classify(err: lettre::transport::smtp::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_permanent() {
        TransportError::Rejected(err.to_string())
    } else {
        // transient replies, connection and TLS failures
        TransportError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        let email = Self::build_message(message)?;
        if let Some(attachment) = &message.attachment_ref {
            tracing::debug!(attachment_ref = %attachment, "Attachment reference not embedded by SMTP transport");
        }

        let response = self.relay.send(email).await.map_err(classify)?;
        let message_id = response.message().next().map(str::to_string);
        Ok(Delivery::accepted(message_id))
    }
}
