//! Application wiring and lifecycle management.
//!
//! `App::run` loads settings, wires the services together, starts the
//! background notifier, and drives the transport update loop until
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::Settings;
use crate::domain::{ChannelId, UserId};
use crate::providers::chat::{TelegramApi, Update};
use crate::providers::mail::MailTmClient;
use crate::services::{
    Caller, GateService, MailboxService, NotifierService, NotifierSettings, RelayService,
    RelaySettings, UserRegistry,
};
use crate::storage::StorageLayer;

/// Pause after a failed update poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    New,
    Inbox,
    Delete,
    Verify,
    Stats,
    Broadcast(String),
}

impl Command {
    /// Parses a message text into a command. Tolerates the `@BotName`
    /// suffix the transport appends in some clients. Non-command text
    /// maps to nothing.
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (word, rest) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (text, ""),
        };
        let word = word.split('@').next().unwrap_or(word);
        match word {
            "/start" => Some(Command::Start),
            "/new" => Some(Command::New),
            "/inbox" => Some(Command::Inbox),
            "/delete" => Some(Command::Delete),
            "/verify" => Some(Command::Verify),
            "/stats" => Some(Command::Stats),
            "/broadcast" if !rest.is_empty() => Some(Command::Broadcast(rest.to_string())),
            _ => None,
        }
    }
}

/// Main application entry point.
pub struct App {
    telegram: Arc<TelegramApi>,
    relay: Arc<RelayService>,
    notifier: Arc<NotifierService>,
}

impl App {
    /// Wires the full service stack from settings.
    pub async fn build(settings: &Settings) -> Result<Self> {
        let storage =
            StorageLayer::open(&settings.storage.state_path, &settings.storage.users_path).await?;
        let provider = Arc::new(MailTmClient::with_base_url(settings.provider.base_url.as_str())?);
        let telegram = Arc::new(TelegramApi::new(settings.transport.bot_token.as_str())?);

        let mailboxes = Arc::new(MailboxService::new(provider, storage.mailboxes()));
        let registry = Arc::new(UserRegistry::new(storage.users()));
        let gate = Arc::new(GateService::new(
            telegram.clone(),
            ChannelId::from(settings.gate.primary_channel.as_str()),
            ChannelId::from(settings.gate.secondary_channel.as_str()),
            Arc::clone(&registry),
        ));
        let relay = Arc::new(RelayService::new(
            Arc::clone(&mailboxes),
            Arc::clone(&registry),
            gate,
            telegram.clone(),
            RelaySettings {
                admin: settings.transport.admin_id.clone().map(UserId::from),
                invite_links: settings.gate.invite_links.clone(),
            },
        ));
        let notifier = Arc::new(NotifierService::new(
            mailboxes,
            registry,
            telegram.clone(),
            NotifierSettings {
                enabled: settings.notifier.enabled,
                poll_interval: Duration::from_secs(settings.notifier.poll_seconds),
            },
        ));

        Ok(Self {
            telegram,
            relay,
            notifier,
        })
    }

    /// Runs the application until interrupted.
    pub async fn run() -> Result<()> {
        let settings = Settings::from_env()?;
        let app = Self::build(&settings).await?;

        let poller = Arc::clone(&app.notifier).start();
        tracing::info!("update loop started");

        let mut offset = 0i64;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                batch = app.telegram.next_updates(offset) => match batch {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            app.dispatch(update).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "update poll failed, backing off");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                },
            }
        }

        tracing::info!("Shutdown requested");
        app.notifier.stop();
        poller.await?;
        Ok(())
    }

    /// Routes one update to the relay. Dispatch failures are logged and
    /// the loop moves on.
    async fn dispatch(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(sender) = message.from else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };

        let mut caller = Caller::new(
            sender.id,
            sender.first_name.as_deref().unwrap_or("there"),
        );
        if let Some(username) = sender.username {
            caller = caller.with_handle(username);
        }

        let outcome = match command {
            Command::Start => self.relay.handle_start(&caller).await,
            Command::New => self.relay.handle_new(&caller).await,
            Command::Inbox => self.relay.handle_inbox(&caller).await,
            Command::Delete => self.relay.handle_delete(&caller).await,
            Command::Verify => self.relay.handle_verify(&caller).await,
            Command::Stats => self.relay.handle_stats(&caller).await,
            Command::Broadcast(text) => {
                self.relay.handle_broadcast(&caller, &text).await.map(|_| ())
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(user = %caller.id, error = %e, "command dispatch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_and_without_arguments() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /new  "), Some(Command::New));
        assert_eq!(Command::parse("/inbox"), Some(Command::Inbox));
        assert_eq!(
            Command::parse("/broadcast scheduled downtime"),
            Some(Command::Broadcast("scheduled downtime".to_string()))
        );
    }

    #[test]
    fn bot_name_suffix_is_tolerated() {
        assert_eq!(Command::parse("/new@BurnboxBot"), Some(Command::New));
    }

    #[test]
    fn non_commands_are_ignored() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("/broadcast"), None);
        assert_eq!(Command::parse(""), None);
    }
}
