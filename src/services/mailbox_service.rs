//! Mailbox service: the sole owner of mailbox records.
//!
//! Orchestrates provisioning, retrieval with dedup, and teardown of
//! disposable mailboxes. All record mutation funnels through this
//! service, and operations for the same user are serialized with a
//! per-user mutex so a foreground fetch and a poller tick can never
//! double-deliver or race a discard mid-flight.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    MailboxRecord, MailboxSession, RemoteMessageFull, RenderedMessage, UserId,
};
use crate::providers::mail::{MailProvider, ProviderError};
use crate::storage::{MailboxStore, StoreError};

/// Local-part length for generated addresses.
const LOCAL_PART_LEN: usize = 10;
/// Password length for generated provider accounts.
const PASSWORD_LEN: usize = 16;

const LOCAL_PART_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Errors surfaced by mailbox operations.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The user already has an active mailbox.
    #[error("an active mailbox already exists")]
    AlreadyExists,

    /// The user has no active mailbox.
    #[error("no active mailbox")]
    NoMailbox,

    /// Provider failure after retry exhaustion.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;

/// Outcome of a latest-message fetch.
///
/// A tagged result instead of exceptions-as-control-flow: callers branch
/// on the variant, and only real failures travel the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote listing was empty.
    Empty,
    /// The newest listed message was already surfaced.
    NoNewMail,
    /// A previously unseen message, ready for delivery.
    NewMail(RenderedMessage),
}

/// Mailbox lifecycle and retrieval service.
pub struct MailboxService {
    provider: Arc<dyn MailProvider>,
    store: Arc<dyn MailboxStore>,
    /// Per-user operation locks. No cross-user locking: records are
    /// independent.
    locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl MailboxService {
    /// Creates a service over a provider client and a record store.
    pub fn new(provider: Arc<dyn MailProvider>, store: Arc<dyn MailboxStore>) -> Self {
        Self {
            provider,
            store,
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Provisions a disposable mailbox for `user` and returns its
    /// address.
    ///
    /// Fails with [`MailboxError::AlreadyExists`] when the user already
    /// has an active record (single-active-mailbox invariant).
    /// Provisioning is not retried automatically.
    pub async fn provision(&self, user: &UserId) -> Result<String> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        if self.store.get(user).await?.is_some() {
            return Err(MailboxError::AlreadyExists);
        }

        let local_part = random_string(LOCAL_PART_ALPHABET, LOCAL_PART_LEN);
        let password = random_string(PASSWORD_ALPHABET, PASSWORD_LEN);

        let provisioned = self
            .provider
            .provision_mailbox(&local_part, &password)
            .await?;

        let record = MailboxRecord::new(provisioned.address.clone(), password, provisioned.token);
        self.store.upsert(user, &record).await?;

        tracing::info!(%user, address = %record.address, "mailbox provisioned");
        Ok(provisioned.address)
    }

    /// Fetches the newest unseen message, if any.
    ///
    /// The provider listing is assumed newest-first; index 0 is treated
    /// as the newest message without timestamp verification. After every
    /// successful listing, all listed messages are requested for
    /// provider-side deletion, best-effort, so the remote mailbox stays
    /// empty whether or not this call surfaced new content.
    pub async fn fetch_latest(&self, user: &UserId) -> Result<FetchOutcome> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .get(user)
            .await?
            .ok_or(MailboxError::NoMailbox)?;
        let mut session = record.session();

        let listing = self.provider.list_messages(&mut session).await?;

        let outcome = match listing.first() {
            None => FetchOutcome::Empty,
            Some(newest) if record.has_seen(&newest.id) => FetchOutcome::NoNewMail,
            Some(newest) => {
                let full = self.provider.fetch_message(&mut session, &newest.id).await?;
                let body = self.resolve_body(&mut session, &full).await;
                let rendered = RenderedMessage::new(&full, body);
                record.mark_seen(full.id.clone());
                FetchOutcome::NewMail(rendered)
            }
        };

        // The dedup mark (and any refreshed token) is persisted before
        // the deletion sweep: a crash past this point never resurfaces a
        // delivered message, and an undelivered one is still listed
        // remotely.
        record.adopt_token(&session);
        self.store.upsert(user, &record).await?;

        for summary in &listing {
            if let Err(e) = self.provider.delete_message(&mut session, &summary.id).await {
                tracing::debug!(%user, message_id = %summary.id, error = %e,
                    "best-effort deletion failed");
            }
        }
        if record.adopt_token(&session) {
            self.store.upsert(user, &record).await?;
        }

        Ok(outcome)
    }

    /// Discards the user's mailbox.
    ///
    /// Provider-side account removal is best-effort and out of scope for
    /// correctness; the record removal is what ends the mailbox.
    pub async fn discard(&self, user: &UserId) -> Result<()> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        if self.store.get(user).await?.is_none() {
            return Err(MailboxError::NoMailbox);
        }
        self.store.remove(user).await?;

        tracing::info!(%user, "mailbox discarded");
        Ok(())
    }

    /// Returns whether the user currently has an active mailbox.
    pub async fn has_mailbox(&self, user: &UserId) -> Result<bool> {
        Ok(self.store.get(user).await?.is_some())
    }

    /// Lists users with an active mailbox, for the notification poller.
    pub async fn active_users(&self) -> Result<Vec<UserId>> {
        Ok(self.store.list_keys().await?)
    }

    /// Resolves the body with the fallback chain: structured text, then
    /// raw source, then (at the rendering layer) the literal
    /// placeholder. Never fails.
    async fn resolve_body(
        &self,
        session: &mut MailboxSession,
        message: &RemoteMessageFull,
    ) -> String {
        if let Some(text) = message.text.as_deref() {
            if !text.trim().is_empty() {
                return text.trim().to_string();
            }
        }
        match self.provider.fetch_source(session, &message.id).await {
            Ok(source) => source.trim().to_string(),
            Err(e) => {
                tracing::debug!(message_id = %message.id, error = %e,
                    "raw source fetch failed, using placeholder body");
                String::new()
            }
        }
    }

    async fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(user.clone()).or_default())
    }
}

/// Generates a random string over the given alphabet.
fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}
