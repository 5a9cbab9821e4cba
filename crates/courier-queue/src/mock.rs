//! Scriptable mail transport for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::transport::{Delivery, MailTransport, OutboundMessage, TransportError};

#[derive(Debug, Clone)]
enum Behavior {
    Reject(String),
    Unavailable,
    Flaky { failures: u32 },
    Hang,
}

/// A mock transport whose per-recipient behaviour is scripted up front.
///
/// Recipients without a rule are accepted. Behaviour is keyed on the
/// message's primary recipient, case-insensitively.
#[derive(Debug, Default)]
pub struct MockTransport {
    behaviors: HashMap<String, Behavior>,
    latency: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    sent: Mutex<Vec<OutboundMessage>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated latency applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Permanently reject mail for `recipient`
    pub fn reject(mut self, recipient: &str, reason: &str) -> Self {
        self.behaviors
            .insert(recipient.to_lowercase(), Behavior::Reject(reason.to_string()));
        self
    }

    /// Report `recipient` as temporarily unavailable on every attempt
    pub fn unavailable(mut self, recipient: &str) -> Self {
        self.behaviors
            .insert(recipient.to_lowercase(), Behavior::Unavailable);
        self
    }

    /// Fail the first `failures` attempts for `recipient` transiently
    pub fn flaky(mut self, recipient: &str, failures: u32) -> Self {
        self.behaviors
            .insert(recipient.to_lowercase(), Behavior::Flaky { failures });
        self
    }

    /// Never answer for `recipient`
    pub fn hang(mut self, recipient: &str) -> Self {
        self.behaviors.insert(recipient.to_lowercase(), Behavior::Hang);
        self
    }

    /// Messages accepted so far
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("mock sent lock poisoned").clone()
    }

    /// Attempts made for `recipient`
    pub fn attempts(&self, recipient: &str) -> u32 {
        self.attempts
            .lock()
            .expect("mock attempts lock poisoned")
            .get(&recipient.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// Total calls to `send`
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `send` calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let key = message.primary_recipient().to_lowercase();
        let attempt = {
            let mut attempts = self.attempts.lock().expect("mock attempts lock poisoned");
            let n = attempts.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.behaviors.get(&key) {
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Reject(reason)) => Err(TransportError::Rejected(reason.clone())),
            Some(Behavior::Unavailable) => {
                Err(TransportError::Unavailable("451 try again later".to_string()))
            }
            Some(Behavior::Flaky { failures }) if attempt <= *failures => Err(
                TransportError::Unavailable(format!("421 busy (attempt {})", attempt)),
            ),
            _ => {
                self.sent
                    .lock()
                    .expect("mock sent lock poisoned")
                    .push(message.clone());
                Ok(Delivery::accepted(Some(format!("<mock-{}@courier.test>", attempt))))
            }
        }
    }
}
