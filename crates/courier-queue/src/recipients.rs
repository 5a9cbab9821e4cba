//! Recipient normalisation and validation

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Reasons a recipient list is rejected before any job or send exists
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipientError {
    #[error("at least one recipient other than the sender is required")]
    Empty,
    #[error("invalid sender address: {0}")]
    InvalidSender(String),
    #[error("invalid recipient address(es): {}", .0.join(", "))]
    Invalid(Vec<String>),
    #[error("too many recipients: {count} (limit {limit})")]
    TooMany { count: usize, limit: usize },
}

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("address pattern is a valid regex")
    })
}

/// Whether `address` looks like a deliverable mailbox.
pub fn is_valid_address(address: &str) -> bool {
    address_regex().is_match(address)
}

/// Turns the raw `to` list of a request into distinct, validated addresses
#[derive(Debug, Clone)]
pub struct RecipientExpander {
    max_recipients: usize,
}

impl Default for RecipientExpander {
    fn default() -> Self {
        Self { max_recipients: 500 }
    }
}

impl RecipientExpander {
    pub fn new(max_recipients: usize) -> Self {
        Self { max_recipients }
    }

    pub fn max_recipients(&self) -> usize {
        self.max_recipients
    }

    /// Split, trim, deduplicate (case-insensitively) and drop the sender.
    ///
    /// Order of first appearance is kept, and so is the first spelling of a
    /// duplicated address.
    pub fn expand<S: AsRef<str>>(
        &self,
        sender: &str,
        raw: &[S],
    ) -> Result<Vec<String>, RecipientError> {
        let sender_key = sender.trim().to_lowercase();
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        let mut invalid = Vec::new();

        let addresses = raw
            .iter()
            .flat_map(|entry| {
                entry
                    .as_ref()
                    .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            })
            .map(str::trim)
            .filter(|a| !a.is_empty());

        for address in addresses {
            let key = address.to_lowercase();
            if key == sender_key || !seen.insert(key) {
                continue;
            }
            if is_valid_address(address) {
                recipients.push(address.to_string());
            } else {
                invalid.push(address.to_string());
            }
        }

        if !invalid.is_empty() {
            return Err(RecipientError::Invalid(invalid));
        }
        if recipients.is_empty() {
            return Err(RecipientError::Empty);
        }
        if recipients.len() > self.max_recipients {
            return Err(RecipientError::TooMany {
                count: recipients.len(),
                limit: self.max_recipients,
            });
        }

        Ok(recipients)
    }
}
