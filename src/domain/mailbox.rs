//! Mailbox record and session types.
//!
//! A [`MailboxRecord`] is the per-user state for one disposable mailbox:
//! the provider-side identity, the short-lived session token, and the set
//! of message ids already surfaced to the user. Records are owned and
//! mutated only through the mailbox service.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Per-user disposable mailbox state.
///
/// Exactly one record exists per user id at any time; the record is
/// created on provisioning and destroyed on explicit deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxRecord {
    /// Provider-side email address. Immutable after provisioning.
    pub address: String,
    /// Provider-side account password. Immutable, never shown to the user.
    pub password: String,
    /// Short-lived bearer token, replaced whenever a provider call
    /// reports an authentication failure.
    pub token: String,
    /// Ids of messages already surfaced to the user. Grows monotonically;
    /// an id enters exactly once and is never removed.
    pub seen_message_ids: HashSet<String>,
}

impl MailboxRecord {
    /// Creates a record for a freshly provisioned mailbox with an empty
    /// dedup set.
    pub fn new(
        address: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            token: token.into(),
            seen_message_ids: HashSet::new(),
        }
    }

    /// Returns whether a message id has already been surfaced.
    pub fn has_seen(&self, message_id: &str) -> bool {
        self.seen_message_ids.contains(message_id)
    }

    /// Marks a message id as surfaced. Returns `true` the first time an
    /// id is marked, `false` on repeats.
    pub fn mark_seen(&mut self, message_id: impl Into<String>) -> bool {
        self.seen_message_ids.insert(message_id.into())
    }

    /// Builds the mutable credential view handed to the provider client.
    pub fn session(&self) -> MailboxSession {
        MailboxSession {
            address: self.address.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
        }
    }

    /// Writes a (possibly refreshed) session token back into the record.
    /// Returns `true` if the token actually changed.
    pub fn adopt_token(&mut self, session: &MailboxSession) -> bool {
        if self.token == session.token {
            return false;
        }
        self.token = session.token.clone();
        true
    }
}

/// Mutable credential view for a single provider interaction.
///
/// The client refreshes `token` in place when the provider reports an
/// authentication failure; the caller is responsible for persisting the
/// refreshed token back into the owning [`MailboxRecord`].
#[derive(Debug, Clone)]
pub struct MailboxSession {
    /// Account address used for token exchange.
    pub address: String,
    /// Account password used for token exchange.
    pub password: String,
    /// Current bearer token.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_empty_dedup_set() {
        let record = MailboxRecord::new("a1b2@example.test", "pw", "tok");
        assert!(record.seen_message_ids.is_empty());
        assert!(!record.has_seen("m1"));
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let mut record = MailboxRecord::new("a1b2@example.test", "pw", "tok");
        assert!(record.mark_seen("m1"));
        assert!(!record.mark_seen("m1"));
        assert!(record.has_seen("m1"));
        assert_eq!(record.seen_message_ids.len(), 1);
    }

    #[test]
    fn adopt_token_detects_refresh() {
        let mut record = MailboxRecord::new("a1b2@example.test", "pw", "tok");
        let mut session = record.session();
        assert!(!record.adopt_token(&session));

        session.token = "fresh".to_string();
        assert!(record.adopt_token(&session));
        assert_eq!(record.token, "fresh");
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = MailboxRecord::new("a1b2@example.test", "pw", "tok");
        record.mark_seen("m1");
        record.mark_seen("m2");

        let json = serde_json::to_string(&record).unwrap();
        let restored: MailboxRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, record);
        assert!(restored.has_seen("m1"));
        assert!(restored.has_seen("m2"));
    }
}
