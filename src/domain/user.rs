//! User profile entity for the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A known user and the verification cache for the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Transport-level user id.
    pub id: UserId,
    /// Display name as last seen.
    pub display_name: String,
    /// Public handle, if the user has one.
    pub handle: Option<String>,
    /// Outcome of the most recent gate check. A cache, not a ledger:
    /// overwritten on every check, and a user can lose and regain it.
    pub verified: bool,
    /// First time this user contacted the relay.
    pub first_seen_at: DateTime<Utc>,
    /// Most recent interaction.
    pub last_seen_at: DateTime<Utc>,
    /// Transport handle of the last message delivered to this user.
    /// Consumed only by the clean-DM transport collaborator.
    pub last_delivered_message_ref: Option<i64>,
}

impl UserProfile {
    /// Creates a profile for a first contact. The user starts unverified.
    pub fn new(id: UserId, display_name: impl Into<String>, handle: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            handle,
            verified: false,
            first_seen_at: now,
            last_seen_at: now,
            last_delivered_message_ref: None,
        }
    }

    /// Refreshes the last-seen timestamp and identity fields on contact.
    pub fn touch(&mut self, display_name: impl Into<String>, handle: Option<String>) {
        self.display_name = display_name.into();
        self.handle = handle;
        self.last_seen_at = Utc::now();
    }
}
