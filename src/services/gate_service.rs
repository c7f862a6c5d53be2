//! Access gate: dual-channel membership verification.
//!
//! Two states, `UNVERIFIED` and `VERIFIED`, with no pending state in
//! between: every check is a fresh evaluation of membership in both
//! configured channels, never a transition guarded by history. Query
//! failures fail closed.

use std::sync::Arc;

use crate::domain::{ChannelId, UserId};
use crate::providers::chat::MembershipCheck;
use crate::services::UserRegistry;

/// Membership gate over two fixed channels.
pub struct GateService {
    checker: Arc<dyn MembershipCheck>,
    channels: [ChannelId; 2],
    registry: Arc<UserRegistry>,
}

impl GateService {
    /// Creates a gate for the two configured channels.
    pub fn new(
        checker: Arc<dyn MembershipCheck>,
        primary: ChannelId,
        secondary: ChannelId,
        registry: Arc<UserRegistry>,
    ) -> Self {
        Self {
            checker,
            channels: [primary, secondary],
            registry,
        }
    }

    /// Runs a fresh membership check against both channels and caches
    /// the outcome into the user's profile, overwriting any prior value.
    ///
    /// Returns `true` only when both channels report an active
    /// membership. Rechecking is free and user-initiated; there is no
    /// backoff.
    pub async fn check(&self, user: &UserId) -> bool {
        let first = self.member_of(user, &self.channels[0]).await;
        let second = self.member_of(user, &self.channels[1]).await;
        let verified = first && second;

        if let Err(e) = self.registry.set_verified(user, verified).await {
            tracing::warn!(%user, error = %e, "failed to cache verification outcome");
        }
        verified
    }

    /// Single-channel query. Any failure, including network errors and
    /// channels the relay cannot see into, counts as non-membership.
    async fn member_of(&self, user: &UserId, channel: &ChannelId) -> bool {
        match self.checker.membership(user, channel).await {
            Ok(status) => status.is_active(),
            Err(e) => {
                tracing::debug!(%user, %channel, error = %e,
                    "membership query failed, failing closed");
                false
            }
        }
    }
}
