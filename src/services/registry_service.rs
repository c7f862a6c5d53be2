//! User registry: directory of known users and their verification cache.
//!
//! Append/update-only: profiles are created on first contact and updated
//! in place afterwards. The `verified` flag is a cache of the most
//! recent gate check, written here on the gate's behalf.

use std::sync::Arc;

use crate::domain::{UserId, UserProfile};
use crate::storage::{StoreError, UserStore};

/// Cap on the profile sample included in [`RegistryStats`].
const STATS_SAMPLE_CAP: usize = 100;

/// Aggregate registry counts plus a bounded profile sample.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Total known users.
    pub total: usize,
    /// Users whose most recent gate check passed.
    pub verified: usize,
    /// Up to [`STATS_SAMPLE_CAP`] profiles for display.
    pub sample: Vec<UserProfile>,
}

/// Store-backed user directory.
pub struct UserRegistry {
    store: Arc<dyn UserStore>,
}

impl UserRegistry {
    /// Creates a registry over a user store.
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Records a user contact: creates the profile on first sight,
    /// otherwise refreshes identity fields and the last-seen timestamp.
    /// When `verified` is given, the cached flag is overwritten in the
    /// same write.
    pub async fn record_contact(
        &self,
        user: &UserId,
        display_name: &str,
        handle: Option<String>,
        verified: Option<bool>,
    ) -> Result<UserProfile, StoreError> {
        let mut profile = match self.store.get(user).await? {
            Some(mut existing) => {
                existing.touch(display_name, handle);
                existing
            }
            None => UserProfile::new(user.clone(), display_name, handle),
        };
        if let Some(verified) = verified {
            profile.verified = verified;
        }
        self.store.upsert(user, &profile).await?;
        Ok(profile)
    }

    /// Overwrites the cached verification flag. Creates a minimal
    /// profile when the user is not yet known.
    pub async fn set_verified(&self, user: &UserId, verified: bool) -> Result<(), StoreError> {
        let mut profile = match self.store.get(user).await? {
            Some(existing) => existing,
            None => UserProfile::new(user.clone(), String::new(), None),
        };
        profile.verified = verified;
        self.store.upsert(user, &profile).await
    }

    /// Returns the profile for a user, if known.
    pub async fn get(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.store.get(user).await
    }

    /// Returns the cached verification flag; unknown users are
    /// unverified.
    pub async fn is_verified(&self, user: &UserId) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(user)
            .await?
            .map(|p| p.verified)
            .unwrap_or(false))
    }

    /// Lists users whose cached flag is verified, the broadcast
    /// recipient set.
    pub async fn verified_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let mut verified = Vec::new();
        for user in self.store.list_keys().await? {
            if self.is_verified(&user).await? {
                verified.push(user);
            }
        }
        Ok(verified)
    }

    /// Stores the transport ref of the last message delivered to a user,
    /// for the clean-DM transport collaborator.
    pub async fn set_last_delivered(
        &self,
        user: &UserId,
        message_ref: Option<i64>,
    ) -> Result<(), StoreError> {
        let Some(mut profile) = self.store.get(user).await? else {
            return Ok(());
        };
        profile.last_delivered_message_ref = message_ref;
        self.store.upsert(user, &profile).await
    }

    /// Aggregates registry counts with a bounded profile sample.
    pub async fn stats(&self) -> Result<RegistryStats, StoreError> {
        let keys = self.store.list_keys().await?;
        let total = keys.len();
        let mut verified = 0;
        let mut sample = Vec::new();
        for user in keys {
            if let Some(profile) = self.store.get(&user).await? {
                if profile.verified {
                    verified += 1;
                }
                if sample.len() < STATS_SAMPLE_CAP {
                    sample.push(profile);
                }
            }
        }
        Ok(RegistryStats {
            total,
            verified,
            sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserProfile;
    use crate::storage::DocumentStore;

    fn registry() -> UserRegistry {
        let store: Arc<DocumentStore<UserProfile>> = Arc::new(DocumentStore::in_memory());
        UserRegistry::new(store)
    }

    #[tokio::test]
    async fn record_contact_creates_then_updates() {
        let registry = registry();
        let user = UserId::from("u-1");

        let created = registry
            .record_contact(&user, "Alice", None, None)
            .await
            .unwrap();
        assert!(!created.verified);

        let updated = registry
            .record_contact(&user, "Alice Smith", Some("alice".into()), Some(true))
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Alice Smith");
        assert!(updated.verified);
        assert_eq!(updated.first_seen_at, created.first_seen_at);
    }

    #[tokio::test]
    async fn unknown_user_is_unverified() {
        let registry = registry();
        assert!(!registry.is_verified(&UserId::from("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn verification_flag_is_a_cache_not_a_ledger() {
        let registry = registry();
        let user = UserId::from("u-1");

        registry.set_verified(&user, true).await.unwrap();
        assert!(registry.is_verified(&user).await.unwrap());

        // Leaving a channel loses verification on the next check.
        registry.set_verified(&user, false).await.unwrap();
        assert!(!registry.is_verified(&user).await.unwrap());

        registry.set_verified(&user, true).await.unwrap();
        assert!(registry.is_verified(&user).await.unwrap());
    }

    #[tokio::test]
    async fn verified_user_ids_filters_unverified() {
        let registry = registry();
        registry
            .record_contact(&UserId::from("u-1"), "A", None, Some(true))
            .await
            .unwrap();
        registry
            .record_contact(&UserId::from("u-2"), "B", None, Some(false))
            .await
            .unwrap();
        registry
            .record_contact(&UserId::from("u-3"), "C", None, Some(true))
            .await
            .unwrap();

        let mut verified = registry.verified_user_ids().await.unwrap();
        verified.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(verified, vec![UserId::from("u-1"), UserId::from("u-3")]);
    }

    #[tokio::test]
    async fn stats_counts_and_samples() {
        let registry = registry();
        registry
            .record_contact(&UserId::from("u-1"), "A", None, Some(true))
            .await
            .unwrap();
        registry
            .record_contact(&UserId::from("u-2"), "B", None, None)
            .await
            .unwrap();

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.sample.len(), 2);
    }

    #[tokio::test]
    async fn last_delivered_ref_round_trips() {
        let registry = registry();
        let user = UserId::from("u-1");
        registry
            .record_contact(&user, "A", None, None)
            .await
            .unwrap();

        registry.set_last_delivered(&user, Some(7)).await.unwrap();
        let profile = registry.get(&user).await.unwrap().unwrap();
        assert_eq!(profile.last_delivered_message_ref, Some(7));

        // Unknown users are silently skipped.
        registry
            .set_last_delivered(&UserId::from("ghost"), Some(9))
            .await
            .unwrap();
    }
}
