//! Collaborator traits for the chat transport.
//!
//! The core never speaks to the transport directly. It consumes two
//! narrow interfaces: a membership query for the access gate, and a
//! single delivery hand-off for every user-visible outcome.

use async_trait::async_trait;

use crate::domain::{ChannelId, UserId};

/// Membership status of a user in a channel, as reported by the
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    /// Regular member.
    Member,
    /// Channel administrator.
    Administrator,
    /// Channel owner/creator.
    Owner,
    /// Present but restricted.
    Restricted,
    /// Left the channel.
    Left,
    /// Banned/kicked from the channel.
    Banned,
}

impl MembershipStatus {
    /// Whether this status counts as active membership for the gate.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MembershipStatus::Member | MembershipStatus::Administrator | MembershipStatus::Owner
        )
    }
}

/// A membership query that could not be answered: network error, the
/// relay lacking visibility into the channel, or a user the transport
/// has never seen. The gate treats all of these as non-membership.
#[derive(Debug, thiserror::Error)]
#[error("membership query failed: {0}")]
pub struct MembershipQueryError(pub String);

/// Membership check collaborator consumed by the access gate.
#[async_trait]
pub trait MembershipCheck: Send + Sync {
    /// Queries the user's status in a channel.
    async fn membership(
        &self,
        user: &UserId,
        channel: &ChannelId,
    ) -> Result<MembershipStatus, MembershipQueryError>;
}

/// Delivery hand-off consumed by the relay and the notification poller.
///
/// `has_active_mailbox` lets the transport pick the matching menu state.
/// Returns the transport-level message ref of the delivered message when
/// the transport exposes one, so the registry can track it for the
/// clean-DM collaborator.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(
        &self,
        user: &UserId,
        text: &str,
        has_active_mailbox: bool,
    ) -> anyhow::Result<Option<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(MembershipStatus::Member.is_active());
        assert!(MembershipStatus::Administrator.is_active());
        assert!(MembershipStatus::Owner.is_active());
    }

    #[test]
    fn inactive_statuses() {
        assert!(!MembershipStatus::Restricted.is_active());
        assert!(!MembershipStatus::Left.is_active());
        assert!(!MembershipStatus::Banned.is_active());
    }
}
