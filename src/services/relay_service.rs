//! Command orchestration: turns user commands into service calls and
//! service outcomes into delivered text.
//!
//! Every command runs the same prologue: gate check first, registry
//! upsert with the fresh verification flag, then the actual service
//! call. Precondition errors become friendly prompts; everything else
//! becomes a generic failure line while the real error goes to the log.
//! All user-visible output leaves through the delivery sink, alongside
//! the caller's current mailbox state so the transport can shape its
//! reply surface.

use std::sync::Arc;

use crate::domain::UserId;
use crate::providers::chat::DeliverySink;
use crate::services::{FetchOutcome, GateService, MailboxError, MailboxService, UserRegistry};

const MSG_JOIN_FIRST: &str = "Access requires membership in both channels. Join them, then send /verify:";
const MSG_VERIFIED: &str = "You are verified. Send /new to get a disposable address.";
const MSG_WELCOME: &str = "Welcome! Send /new for a disposable address, /inbox to read mail, /delete to burn the mailbox.";
const MSG_ALREADY_EXISTS: &str = "You already have an active mailbox. Burn it with /delete before creating a new one.";
const MSG_NO_MAILBOX: &str = "You have no active mailbox. Create one with /new.";
const MSG_INBOX_EMPTY: &str = "Your mailbox is empty.";
const MSG_NO_NEW_MAIL: &str = "No new mail.";
const MSG_DELETED: &str = "Mailbox burned. Send /new whenever you want a fresh address.";
const MSG_NOT_ADMIN: &str = "This command is not available.";
const MSG_FAILURE: &str = "Something went wrong, please try again in a moment.";

/// Identity of the user issuing a command, as reported by the
/// transport.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: UserId,
    pub display_name: String,
    pub handle: Option<String>,
}

impl Caller {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// Orchestration configuration.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    /// User allowed to run /stats and /broadcast. `None` disables both.
    pub admin: Option<UserId>,
    /// Invite links shown alongside the join prompt.
    pub invite_links: Vec<String>,
}

/// Command front of the relay: gate, registry, mailbox manager, and the
/// delivery sink wired together.
pub struct RelayService {
    mailboxes: Arc<MailboxService>,
    registry: Arc<UserRegistry>,
    gate: Arc<GateService>,
    sink: Arc<dyn DeliverySink>,
    settings: RelaySettings,
}

impl RelayService {
    pub fn new(
        mailboxes: Arc<MailboxService>,
        registry: Arc<UserRegistry>,
        gate: Arc<GateService>,
        sink: Arc<dyn DeliverySink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            mailboxes,
            registry,
            gate,
            sink,
            settings,
        }
    }

    /// First contact. Gates, records the profile, and greets.
    pub async fn handle_start(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.admit(caller).await? {
            return Ok(());
        }
        self.reply(&caller.id, MSG_WELCOME).await
    }

    /// Provisions a fresh disposable address for the caller.
    pub async fn handle_new(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.admit(caller).await? {
            return Ok(());
        }
        let text = match self.mailboxes.provision(&caller.id).await {
            Ok(address) => format!("Your disposable address is ready:\n{address}"),
            Err(MailboxError::AlreadyExists) => MSG_ALREADY_EXISTS.to_string(),
            Err(e) => {
                tracing::error!(user = %caller.id, error = %e, "provisioning failed");
                MSG_FAILURE.to_string()
            }
        };
        self.reply(&caller.id, &text).await
    }

    /// Fetches the newest unseen message, if any.
    pub async fn handle_inbox(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.admit(caller).await? {
            return Ok(());
        }
        let text = match self.mailboxes.fetch_latest(&caller.id).await {
            Ok(FetchOutcome::NewMail(rendered)) => rendered.to_text(),
            Ok(FetchOutcome::Empty) => MSG_INBOX_EMPTY.to_string(),
            Ok(FetchOutcome::NoNewMail) => MSG_NO_NEW_MAIL.to_string(),
            Err(MailboxError::NoMailbox) => MSG_NO_MAILBOX.to_string(),
            Err(e) => {
                tracing::error!(user = %caller.id, error = %e, "inbox fetch failed");
                MSG_FAILURE.to_string()
            }
        };
        self.reply(&caller.id, &text).await
    }

    /// Burns the caller's mailbox.
    pub async fn handle_delete(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.admit(caller).await? {
            return Ok(());
        }
        let text = match self.mailboxes.discard(&caller.id).await {
            Ok(()) => MSG_DELETED.to_string(),
            Err(MailboxError::NoMailbox) => MSG_NO_MAILBOX.to_string(),
            Err(e) => {
                tracing::error!(user = %caller.id, error = %e, "discard failed");
                MSG_FAILURE.to_string()
            }
        };
        self.reply(&caller.id, &text).await
    }

    /// Manual re-verification: re-runs the gate and reports the outcome.
    pub async fn handle_verify(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.admit(caller).await? {
            return Ok(());
        }
        self.reply(&caller.id, MSG_VERIFIED).await
    }

    /// Admin-only registry summary.
    pub async fn handle_stats(&self, caller: &Caller) -> anyhow::Result<()> {
        if !self.is_admin(&caller.id) {
            return self.reply(&caller.id, MSG_NOT_ADMIN).await;
        }
        let text = match self.registry.stats().await {
            Ok(stats) => {
                let mut lines = vec![
                    format!("Users: {}", stats.total),
                    format!("Verified: {}", stats.verified),
                ];
                for profile in &stats.sample {
                    let handle = profile.handle.as_deref().unwrap_or("-");
                    lines.push(format!("  {} ({handle})", profile.display_name));
                }
                lines.join("\n")
            }
            Err(e) => {
                tracing::error!(error = %e, "stats lookup failed");
                MSG_FAILURE.to_string()
            }
        };
        self.reply(&caller.id, &text).await
    }

    /// Admin-only fan-out to every verified user. Returns the number of
    /// successful deliveries; per-recipient failures are logged and
    /// skipped.
    pub async fn handle_broadcast(&self, caller: &Caller, text: &str) -> anyhow::Result<usize> {
        if !self.is_admin(&caller.id) {
            self.reply(&caller.id, MSG_NOT_ADMIN).await?;
            return Ok(0);
        }

        let recipients = self.registry.verified_user_ids().await?;
        let mut delivered = 0;
        for user in &recipients {
            match self.reply(user, text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(%user, error = %e, "broadcast delivery failed, skipping");
                }
            }
        }

        self.reply(
            &caller.id,
            &format!("Broadcast delivered to {delivered}/{} users.", recipients.len()),
        )
        .await?;
        Ok(delivered)
    }

    /// Command prologue: fresh gate check, registry upsert carrying the
    /// outcome, join prompt on refusal. Returns whether the caller may
    /// proceed.
    async fn admit(&self, caller: &Caller) -> anyhow::Result<bool> {
        let verified = self.gate.check(&caller.id).await;
        self.registry
            .record_contact(
                &caller.id,
                &caller.display_name,
                caller.handle.clone(),
                Some(verified),
            )
            .await?;

        if !verified {
            let mut text = MSG_JOIN_FIRST.to_string();
            for link in &self.settings.invite_links {
                text.push('\n');
                text.push_str(link);
            }
            self.reply(&caller.id, &text).await?;
        }
        Ok(verified)
    }

    fn is_admin(&self, user: &UserId) -> bool {
        self.settings.admin.as_ref() == Some(user)
    }

    /// Hands text to the sink with the caller's mailbox state and files
    /// the transport message ref for later cleanup.
    async fn reply(&self, user: &UserId, text: &str) -> anyhow::Result<()> {
        let has_mailbox = self.mailboxes.has_mailbox(user).await.unwrap_or(false);
        let message_ref = self.sink.deliver(user, text, has_mailbox).await?;
        if let Err(e) = self.registry.set_last_delivered(user, message_ref).await {
            tracing::warn!(%user, error = %e, "failed to record delivered message ref");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, MailboxRecord, MailboxSession, RemoteMessageFull,
        RemoteMessageSummary, UserProfile};
    use crate::providers::chat::{MembershipCheck, MembershipQueryError, MembershipStatus};
    use crate::providers::mail::{MailProvider, ProvisionedMailbox, Result as MailResult};
    use crate::storage::DocumentStore;

    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct FixedMembership(MembershipStatus);

    #[async_trait]
    impl MembershipCheck for FixedMembership {
        async fn membership(
            &self,
            _user: &UserId,
            _channel: &ChannelId,
        ) -> Result<MembershipStatus, MembershipQueryError> {
            Ok(self.0)
        }
    }

    /// Sink that records every hand-off; optionally refuses a set of
    /// recipients.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(UserId, String, bool)>>,
        refuse: Mutex<HashSet<UserId>>,
    }

    impl RecordingSink {
        fn texts_for(&self, user: &UserId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, _)| id == user)
                .map(|(_, text, _)| text.clone())
                .collect()
        }

        fn refuse(&self, user: UserId) {
            self.refuse.lock().unwrap().insert(user);
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(
            &self,
            user: &UserId,
            text: &str,
            has_active_mailbox: bool,
        ) -> anyhow::Result<Option<i64>> {
            if self.refuse.lock().unwrap().contains(user) {
                anyhow::bail!("recipient unreachable");
            }
            self.sent
                .lock()
                .unwrap()
                .push((user.clone(), text.to_string(), has_active_mailbox));
            Ok(Some(1))
        }
    }

    struct QuietProvider;

    #[async_trait]
    impl MailProvider for QuietProvider {
        async fn provision_mailbox(
            &self,
            local_part: &str,
            _password: &str,
        ) -> MailResult<ProvisionedMailbox> {
            Ok(ProvisionedMailbox {
                address: format!("{local_part}@quiet.test"),
                token: "tok".to_string(),
            })
        }

        async fn list_messages(
            &self,
            _session: &mut MailboxSession,
        ) -> MailResult<Vec<RemoteMessageSummary>> {
            Ok(vec![])
        }

        async fn fetch_message(
            &self,
            _session: &mut MailboxSession,
            message_id: &str,
        ) -> MailResult<RemoteMessageFull> {
            Err(crate::providers::mail::ProviderError::Status {
                code: 404,
                body: message_id.to_string(),
            })
        }

        async fn fetch_source(
            &self,
            _session: &mut MailboxSession,
            _message_id: &str,
        ) -> MailResult<String> {
            Ok(String::new())
        }

        async fn delete_message(
            &self,
            _session: &mut MailboxSession,
            _message_id: &str,
        ) -> MailResult<()> {
            Ok(())
        }
    }

    struct Rig {
        relay: RelayService,
        registry: Arc<UserRegistry>,
        sink: Arc<RecordingSink>,
    }

    fn rig(membership: MembershipStatus, admin: Option<UserId>) -> Rig {
        let mailbox_store: Arc<DocumentStore<MailboxRecord>> = Arc::new(DocumentStore::in_memory());
        let user_store: Arc<DocumentStore<UserProfile>> = Arc::new(DocumentStore::in_memory());
        let mailboxes = Arc::new(MailboxService::new(Arc::new(QuietProvider), mailbox_store));
        let registry = Arc::new(UserRegistry::new(user_store));
        let gate = Arc::new(GateService::new(
            Arc::new(FixedMembership(membership)),
            ChannelId::from("c-1"),
            ChannelId::from("c-2"),
            Arc::clone(&registry),
        ));
        let sink = Arc::new(RecordingSink::default());
        let relay = RelayService::new(
            mailboxes,
            Arc::clone(&registry),
            gate,
            sink.clone(),
            RelaySettings {
                admin,
                invite_links: vec!["https://chat.example/one".to_string()],
            },
        );
        Rig {
            relay,
            registry,
            sink,
        }
    }

    #[tokio::test]
    async fn non_member_gets_join_prompt_and_nothing_else() {
        let rig = rig(MembershipStatus::Left, None);
        let caller = Caller::new("u-1", "Ada");

        rig.relay.handle_new(&caller).await.unwrap();

        let texts = rig.sink.texts_for(&caller.id);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(MSG_JOIN_FIRST));
        assert!(texts[0].contains("https://chat.example/one"));
        assert!(!rig.registry.is_verified(&caller.id).await.unwrap());
    }

    #[tokio::test]
    async fn member_can_provision_once() {
        let rig = rig(MembershipStatus::Member, None);
        let caller = Caller::new("u-1", "Ada").with_handle("ada");

        rig.relay.handle_new(&caller).await.unwrap();
        rig.relay.handle_new(&caller).await.unwrap();

        let texts = rig.sink.texts_for(&caller.id);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("@quiet.test"));
        assert_eq!(texts[1], MSG_ALREADY_EXISTS);

        let profile = rig.registry.get(&caller.id).await.unwrap().unwrap();
        assert!(profile.verified);
        assert_eq!(profile.handle.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn inbox_without_mailbox_prompts_for_new() {
        let rig = rig(MembershipStatus::Member, None);
        let caller = Caller::new("u-1", "Ada");

        rig.relay.handle_inbox(&caller).await.unwrap();

        assert_eq!(rig.sink.texts_for(&caller.id), vec![MSG_NO_MAILBOX.to_string()]);
    }

    #[tokio::test]
    async fn delete_then_new_starts_over() {
        let rig = rig(MembershipStatus::Member, None);
        let caller = Caller::new("u-1", "Ada");

        rig.relay.handle_new(&caller).await.unwrap();
        rig.relay.handle_delete(&caller).await.unwrap();
        rig.relay.handle_new(&caller).await.unwrap();

        let texts = rig.sink.texts_for(&caller.id);
        assert_eq!(texts[1], MSG_DELETED);
        assert!(texts[2].contains("@quiet.test"));
    }

    #[tokio::test]
    async fn reply_carries_mailbox_state() {
        let rig = rig(MembershipStatus::Member, None);
        let caller = Caller::new("u-1", "Ada");

        rig.relay.handle_start(&caller).await.unwrap();
        rig.relay.handle_new(&caller).await.unwrap();

        let sent = rig.sink.sent.lock().unwrap().clone();
        assert!(!sent[0].2, "no mailbox before provisioning");
        assert!(sent[1].2, "mailbox active after provisioning");
    }

    #[tokio::test]
    async fn stats_is_admin_only() {
        let admin = UserId::from("admin");
        let rig = rig(MembershipStatus::Member, Some(admin.clone()));

        rig.relay
            .handle_stats(&Caller::new("u-1", "Ada"))
            .await
            .unwrap();
        assert_eq!(
            rig.sink.texts_for(&UserId::from("u-1")),
            vec![MSG_NOT_ADMIN.to_string()]
        );

        rig.relay
            .handle_stats(&Caller::new("admin", "Boss"))
            .await
            .unwrap();
        let texts = rig.sink.texts_for(&admin);
        assert!(texts[0].starts_with("Users: "));
    }

    #[tokio::test]
    async fn broadcast_reaches_verified_users_and_skips_failures() {
        let admin = UserId::from("admin");
        let rig = rig(MembershipStatus::Member, Some(admin.clone()));

        for id in ["u-1", "u-2", "u-3"] {
            rig.registry
                .record_contact(&UserId::from(id), "User", None, Some(true))
                .await
                .unwrap();
        }
        rig.registry
            .record_contact(&UserId::from("u-4"), "Lurker", None, Some(false))
            .await
            .unwrap();
        rig.sink.refuse(UserId::from("u-2"));

        let delivered = rig
            .relay
            .handle_broadcast(&Caller::new("admin", "Boss"), "maintenance tonight")
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(
            rig.sink.texts_for(&UserId::from("u-1")),
            vec!["maintenance tonight".to_string()]
        );
        assert!(rig.sink.texts_for(&UserId::from("u-4")).is_empty());
        assert!(rig.sink.texts_for(&admin)[0].starts_with("Broadcast delivered to 2/3"));
    }
}
