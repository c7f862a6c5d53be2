//! Transient message types owned by the mail provider.
//!
//! These types live only for the duration of a single operation and are
//! never persisted; dedup state is tracked by message id on the
//! [`MailboxRecord`](super::MailboxRecord).

use serde::{Deserialize, Serialize};

/// Body text used when a message has neither structured text nor a
/// readable raw source.
pub const NO_BODY_PLACEHOLDER: &str = "(no body)";

/// Subject line used when a message carries no subject.
pub const NO_SUBJECT_PLACEHOLDER: &str = "(no subject)";

/// Sender or recipient address as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddress {
    /// Bare email address.
    #[serde(default)]
    pub address: String,
    /// Display name, when the sender supplied one.
    #[serde(default)]
    pub name: Option<String>,
}

impl RemoteAddress {
    /// Formats the address as a from-line: `Name <addr>` when a display
    /// name is present, `<addr>` otherwise.
    pub fn from_line(&self) -> String {
        let address = if self.address.is_empty() {
            "unknown"
        } else {
            self.address.as_str()
        };
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{} <{}>", name, address),
            None => format!("<{}>", address),
        }
    }
}

/// One entry in the provider's message listing, newest first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessageSummary {
    /// Provider-assigned message id.
    pub id: String,
    /// Sender, when the provider includes it in the listing.
    #[serde(default)]
    pub from: Option<RemoteAddress>,
    /// Subject, when present.
    #[serde(default)]
    pub subject: Option<String>,
    /// Short body preview.
    #[serde(default)]
    pub intro: Option<String>,
    /// Provider-side creation timestamp, kept as-is for diagnostics.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A fully fetched message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessageFull {
    /// Provider-assigned message id.
    pub id: String,
    /// Sender.
    #[serde(default)]
    pub from: Option<RemoteAddress>,
    /// Subject, when present.
    #[serde(default)]
    pub subject: Option<String>,
    /// Structured plain-text body. Blank for HTML-only messages.
    #[serde(default)]
    pub text: Option<String>,
}

/// The rendering triple surfaced for a newly seen message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Formatted sender line.
    pub from_line: String,
    /// Subject, placeholder-substituted when absent.
    pub subject: String,
    /// Body text after the fallback chain (text, raw source, placeholder).
    pub body: String,
}

impl RenderedMessage {
    /// Builds the triple from a fetched message and its resolved body.
    pub fn new(message: &RemoteMessageFull, body: impl Into<String>) -> Self {
        let from_line = message
            .from
            .as_ref()
            .map(RemoteAddress::from_line)
            .unwrap_or_else(|| "<unknown>".to_string());
        let subject = message
            .subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(NO_SUBJECT_PLACEHOLDER)
            .to_string();
        let body = body.into();
        Self {
            from_line,
            subject,
            body: if body.trim().is_empty() {
                NO_BODY_PLACEHOLDER.to_string()
            } else {
                body
            },
        }
    }

    /// Plain-text rendering handed to the delivery sink.
    pub fn to_text(&self) -> String {
        format!("From: {}\n{}\n\n{}", self.from_line, self.subject, self.body)
    }
}
