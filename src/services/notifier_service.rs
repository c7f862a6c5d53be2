//! Notification poller: background new-mail detection.
//!
//! A single long-running loop that, every `poll_interval`, asks the
//! mailbox service for unseen mail on behalf of every verified user with
//! an active mailbox and pushes a delivery event for each hit. A single
//! user's failure never aborts the tick for the others; the loop itself
//! only stops on shutdown.
//!
//! Ticks are idempotent: the dedup set on the mailbox record is the
//! authority for what is new, not poller-local memory, so running the
//! same tick twice delivers at most once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::services::{FetchOutcome, MailboxService, UserRegistry};
use crate::providers::chat::DeliverySink;

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Master switch for background notifications.
    pub enabled: bool,
    /// Interval between polling passes.
    pub poll_interval: Duration,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Counters for one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Users with an active mailbox and a verified cache entry that were
    /// actually polled.
    pub polled: usize,
    /// Users skipped because their cached verification flag is false.
    pub skipped_unverified: usize,
    /// New-mail events handed to the delivery sink.
    pub delivered: usize,
    /// Per-user failures that were logged and skipped.
    pub failures: usize,
}

/// Background new-mail poller.
pub struct NotifierService {
    mailboxes: Arc<MailboxService>,
    registry: Arc<UserRegistry>,
    sink: Arc<dyn DeliverySink>,
    settings: NotifierSettings,
    stop_flag: AtomicBool,
}

impl NotifierService {
    /// Creates a poller over the mailbox service, registry, and sink.
    pub fn new(
        mailboxes: Arc<MailboxService>,
        registry: Arc<UserRegistry>,
        sink: Arc<dyn DeliverySink>,
        settings: NotifierSettings,
    ) -> Self {
        Self {
            mailboxes,
            registry,
            sink,
            settings,
            stop_flag: AtomicBool::new(false),
        }
    }

    /// Starts the polling loop on the runtime. Returns immediately; call
    /// [`stop`](Self::stop) to end the loop at the next tick boundary.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.stop_flag.store(false, Ordering::SeqCst);
        let service = Arc::clone(&self);

        tokio::spawn(async move {
            if !service.settings.enabled {
                tracing::info!("notifier disabled, background polling not started");
                return;
            }
            tracing::info!(interval_secs = service.settings.poll_interval.as_secs(),
                "notifier started");

            loop {
                if service.stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let report = service.tick().await;
                if report.delivered > 0 || report.failures > 0 {
                    tracing::debug!(?report, "poll tick finished");
                }
                tokio::time::sleep(service.settings.poll_interval).await;
            }

            tracing::info!("notifier stopped");
        })
    }

    /// Requests the loop to stop at the next tick boundary.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Whether the loop has not been asked to stop.
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }

    /// One polling pass over every active mailbox. Never fails: all
    /// per-user errors are swallowed here so one user cannot starve the
    /// rest; the next tick retries naturally.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let users = match self.mailboxes.active_users().await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "could not list active mailboxes, skipping tick");
                report.failures += 1;
                return report;
            }
        };

        for user in users {
            let verified = match self.registry.is_verified(&user).await {
                Ok(verified) => verified,
                Err(e) => {
                    tracing::warn!(%user, error = %e, "verification lookup failed, skipping user");
                    report.failures += 1;
                    continue;
                }
            };
            if !verified {
                report.skipped_unverified += 1;
                continue;
            }

            report.polled += 1;
            match self.mailboxes.fetch_latest(&user).await {
                Ok(FetchOutcome::NewMail(rendered)) => {
                    match self.sink.deliver(&user, &rendered.to_text(), true).await {
                        Ok(message_ref) => {
                            report.delivered += 1;
                            if let Err(e) =
                                self.registry.set_last_delivered(&user, message_ref).await
                            {
                                tracing::warn!(%user, error = %e,
                                    "failed to record delivered message ref");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%user, error = %e, "delivery failed, skipping user");
                            report.failures += 1;
                        }
                    }
                }
                Ok(FetchOutcome::Empty) | Ok(FetchOutcome::NoNewMail) => {}
                Err(e) => {
                    tracing::warn!(%user, error = %e, "poll failed for user, skipping");
                    report.failures += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MailboxRecord, UserId, UserProfile};
    use crate::providers::mail::{MailProvider, ProvisionedMailbox};
    use crate::storage::DocumentStore;

    use async_trait::async_trait;

    /// Provider whose listings are always empty.
    struct IdleProvider;

    #[async_trait]
    impl MailProvider for IdleProvider {
        async fn provision_mailbox(
            &self,
            local_part: &str,
            _password: &str,
        ) -> crate::providers::mail::Result<ProvisionedMailbox> {
            Ok(ProvisionedMailbox {
                address: format!("{local_part}@idle.test"),
                token: "tok".to_string(),
            })
        }

        async fn list_messages(
            &self,
            _session: &mut crate::domain::MailboxSession,
        ) -> crate::providers::mail::Result<Vec<crate::domain::RemoteMessageSummary>> {
            Ok(vec![])
        }

        async fn fetch_message(
            &self,
            _session: &mut crate::domain::MailboxSession,
            message_id: &str,
        ) -> crate::providers::mail::Result<crate::domain::RemoteMessageFull> {
            Err(crate::providers::mail::ProviderError::Status {
                code: 404,
                body: message_id.to_string(),
            })
        }

        async fn fetch_source(
            &self,
            _session: &mut crate::domain::MailboxSession,
            _message_id: &str,
        ) -> crate::providers::mail::Result<String> {
            Ok(String::new())
        }

        async fn delete_message(
            &self,
            _session: &mut crate::domain::MailboxSession,
            _message_id: &str,
        ) -> crate::providers::mail::Result<()> {
            Ok(())
        }
    }

    /// Sink that records nothing and always succeeds.
    struct NullSink;

    #[async_trait]
    impl crate::providers::chat::DeliverySink for NullSink {
        async fn deliver(
            &self,
            _user: &UserId,
            _text: &str,
            _has_active_mailbox: bool,
        ) -> anyhow::Result<Option<i64>> {
            Ok(None)
        }
    }

    fn notifier() -> Arc<NotifierService> {
        let mailbox_store: Arc<DocumentStore<MailboxRecord>> = Arc::new(DocumentStore::in_memory());
        let user_store: Arc<DocumentStore<UserProfile>> = Arc::new(DocumentStore::in_memory());
        let mailboxes = Arc::new(MailboxService::new(Arc::new(IdleProvider), mailbox_store));
        let registry = Arc::new(UserRegistry::new(user_store));
        Arc::new(NotifierService::new(
            mailboxes,
            registry,
            Arc::new(NullSink),
            NotifierSettings::default(),
        ))
    }

    #[tokio::test]
    async fn tick_with_no_mailboxes_is_a_noop() {
        let notifier = notifier();
        let report = notifier.tick().await;
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn unverified_users_are_skipped() {
        let notifier = notifier();
        let user = UserId::from("u-1");
        notifier.mailboxes.provision(&user).await.unwrap();
        // Registry has no verified entry for the user.

        let report = notifier.tick().await;
        assert_eq!(report.skipped_unverified, 1);
        assert_eq!(report.polled, 0);
    }

    #[tokio::test]
    async fn stop_flag_controls_running_state() {
        let notifier = notifier();
        assert!(notifier.is_running());
        notifier.stop();
        assert!(!notifier.is_running());
    }

    #[test]
    fn default_settings_poll_every_fifteen_seconds() {
        let settings = NotifierSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
    }
}
