//! JSON document store keyed by user id.
//!
//! One store holds one persisted mapping (user id -> entity) as a single
//! JSON document, mirroring the split between the mailbox state file and
//! the user registry file. Writes are atomic per document: the new
//! content lands in a sibling temp file that is renamed over the target.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Result, StoreError};
use crate::domain::UserId;

/// Async map-shaped store with optional JSON-file persistence.
///
/// All reads are served from memory; every mutation rewrites the backing
/// document when one is configured. Stores created with
/// [`in_memory`](Self::in_memory) never touch the filesystem.
pub struct DocumentStore<T> {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, T>>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Opens a store backed by `path`, loading the existing document if
    /// one is present. A missing file starts the store empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Creates a store with no persistence, for tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a clone of the entry for `user`, if any.
    pub async fn get(&self, user: &UserId) -> Result<Option<T>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&user.0).cloned())
    }

    /// Inserts or replaces the entry for `user` and persists the
    /// document.
    pub async fn upsert(&self, user: &UserId, value: &T) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(user.0.clone(), value.clone());
        self.persist(&entries).await
    }

    /// Removes the entry for `user` (a no-op when absent) and persists
    /// the document.
    pub async fn remove(&self, user: &UserId) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&user.0);
        self.persist(&entries).await
    }

    /// Lists all user ids with an entry.
    pub async fn list_keys(&self) -> Result<Vec<UserId>> {
        let entries = self.entries.read().await;
        Ok(entries.keys().cloned().map(UserId).collect())
    }

    /// Writes the document via temp file + rename so a crash mid-write
    /// never leaves a truncated document behind.
    async fn persist(&self, entries: &HashMap<String, T>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
