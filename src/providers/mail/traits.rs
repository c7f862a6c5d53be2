//! Mail provider trait definition.
//!
//! This module defines the [`MailProvider`] trait which abstracts over the
//! remote disposable-mail backend. The mailbox service talks only to this
//! trait; the concrete REST client lives in
//! [`mailtm`](super::MailTmClient).

use async_trait::async_trait;

use crate::domain::{MailboxSession, RemoteMessageFull, RemoteMessageSummary};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or the session token expired.
    ///
    /// The client retries an operation failing with this class exactly
    /// once after a token refresh; callers never observe it from a
    /// completed client operation.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error, including timeouts.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, JSON or raw text.
        body: String,
    },

    /// The response body could not be parsed.
    #[error("bad payload: {0}")]
    Payload(String),

    /// Provider-level failure that is not retryable.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Returns whether this failure is authentication-class and therefore
    /// eligible for the single token-refresh retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Authentication(_))
    }

    /// Escalates an authentication failure that survived the one allowed
    /// retry into a hard, non-retryable error.
    pub fn escalated(self) -> Self {
        match self {
            ProviderError::Authentication(msg) => {
                ProviderError::Provider(format!("authentication failed after token refresh: {msg}"))
            }
            other => other,
        }
    }
}

/// Identity returned by a successful provisioning call.
#[derive(Debug, Clone)]
pub struct ProvisionedMailbox {
    /// Full address, local part joined to a provider-chosen domain.
    pub address: String,
    /// Initial session token for the new account.
    pub token: String,
}

/// Trait for the remote disposable-mail backend.
///
/// Every authenticated operation takes a mutable [`MailboxSession`]; the
/// implementation refreshes the session token in place when the provider
/// reports an authentication failure, retries the call exactly once, and
/// surfaces a second failure as a hard error. Implementations hold no
/// per-mailbox state; each call is independent.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Creates a provider-side account from a generated local part and
    /// password, returning the full address and an initial token.
    ///
    /// Provisioning is never retried automatically.
    async fn provision_mailbox(
        &self,
        local_part: &str,
        password: &str,
    ) -> Result<ProvisionedMailbox>;

    /// Lists messages for the mailbox, newest first (index 0 is newest).
    async fn list_messages(
        &self,
        session: &mut MailboxSession,
    ) -> Result<Vec<RemoteMessageSummary>>;

    /// Fetches a complete message by id.
    async fn fetch_message(
        &self,
        session: &mut MailboxSession,
        message_id: &str,
    ) -> Result<RemoteMessageFull>;

    /// Fetches the raw source of a message, used as the body fallback
    /// when the structured text field is blank.
    async fn fetch_source(&self, session: &mut MailboxSession, message_id: &str) -> Result<String>;

    /// Requests provider-side deletion of a message.
    async fn delete_message(&self, session: &mut MailboxSession, message_id: &str) -> Result<()>;
}
