//! Persistence layer.
//!
//! The core depends only on the [`MailboxStore`] and [`UserStore`]
//! traits; the concrete backing is a pair of JSON documents (mailbox
//! state and user registry), with an in-memory variant for tests.

mod document;

pub use document::DocumentStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::domain::{MailboxRecord, UserId, UserProfile};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unwritable document.
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Store for per-user mailbox records.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Returns the record for a user, if one exists.
    async fn get(&self, user: &UserId) -> Result<Option<MailboxRecord>>;

    /// Inserts or replaces a user's record.
    async fn upsert(&self, user: &UserId, record: &MailboxRecord) -> Result<()>;

    /// Removes a user's record.
    async fn remove(&self, user: &UserId) -> Result<()>;

    /// Lists all users with an active record.
    async fn list_keys(&self) -> Result<Vec<UserId>>;
}

/// Store for user profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns the profile for a user, if one exists.
    async fn get(&self, user: &UserId) -> Result<Option<UserProfile>>;

    /// Inserts or replaces a user's profile.
    async fn upsert(&self, user: &UserId, profile: &UserProfile) -> Result<()>;

    /// Removes a user's profile.
    async fn remove(&self, user: &UserId) -> Result<()>;

    /// Lists all known user ids.
    async fn list_keys(&self) -> Result<Vec<UserId>>;
}

#[async_trait]
impl MailboxStore for DocumentStore<MailboxRecord> {
    async fn get(&self, user: &UserId) -> Result<Option<MailboxRecord>> {
        DocumentStore::get(self, user).await
    }

    async fn upsert(&self, user: &UserId, record: &MailboxRecord) -> Result<()> {
        DocumentStore::upsert(self, user, record).await
    }

    async fn remove(&self, user: &UserId) -> Result<()> {
        DocumentStore::remove(self, user).await
    }

    async fn list_keys(&self) -> Result<Vec<UserId>> {
        DocumentStore::list_keys(self).await
    }
}

#[async_trait]
impl UserStore for DocumentStore<UserProfile> {
    async fn get(&self, user: &UserId) -> Result<Option<UserProfile>> {
        DocumentStore::get(self, user).await
    }

    async fn upsert(&self, user: &UserId, profile: &UserProfile) -> Result<()> {
        DocumentStore::upsert(self, user, profile).await
    }

    async fn remove(&self, user: &UserId) -> Result<()> {
        DocumentStore::remove(self, user).await
    }

    async fn list_keys(&self) -> Result<Vec<UserId>> {
        DocumentStore::list_keys(self).await
    }
}

/// Combined storage layer: mailbox state plus the user registry.
///
/// This is the main entry point for wiring persistence into the
/// services.
pub struct StorageLayer {
    mailboxes: Arc<DocumentStore<MailboxRecord>>,
    users: Arc<DocumentStore<UserProfile>>,
}

impl StorageLayer {
    /// Opens both documents at the given paths.
    pub async fn open(
        state_path: impl AsRef<Path>,
        users_path: impl AsRef<Path>,
    ) -> Result<Self> {
        Ok(Self {
            mailboxes: Arc::new(DocumentStore::open(state_path).await?),
            users: Arc::new(DocumentStore::open(users_path).await?),
        })
    }

    /// Creates a storage layer with in-memory documents for testing.
    pub fn in_memory() -> Self {
        Self {
            mailboxes: Arc::new(DocumentStore::in_memory()),
            users: Arc::new(DocumentStore::in_memory()),
        }
    }

    /// Returns the mailbox store handle.
    pub fn mailboxes(&self) -> Arc<DocumentStore<MailboxRecord>> {
        Arc::clone(&self.mailboxes)
    }

    /// Returns the user store handle.
    pub fn users(&self) -> Arc<DocumentStore<UserProfile>> {
        Arc::clone(&self.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_layer_in_memory_starts_empty() {
        let storage = StorageLayer::in_memory();
        assert!(MailboxStore::list_keys(&*storage.mailboxes())
            .await
            .unwrap()
            .is_empty());
        assert!(UserStore::list_keys(&*storage.users())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn storage_layer_opens_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageLayer::open(
            dir.path().join("state.json"),
            dir.path().join("users.json"),
        )
        .await
        .unwrap();

        let user = UserId::from("u-1");
        let record = MailboxRecord::new("a@b.test", "pw", "tok");
        MailboxStore::upsert(&*storage.mailboxes(), &user, &record)
            .await
            .unwrap();

        assert!(dir.path().join("state.json").exists());
    }
}
