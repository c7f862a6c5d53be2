//! Telegram Bot API adapter.
//!
//! Implements the two collaborator traits the core consumes:
//! [`MembershipCheck`] via `getChatMember` and [`DeliverySink`] via
//! `sendMessage`, plus a raw `getUpdates` long poll for the app-level
//! update loop. Command routing lives in the app layer; this adapter
//! carries none of it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{DeliverySink, MembershipCheck, MembershipQueryError, MembershipStatus};
use crate::domain::{ChannelId, UserId};

const TELEGRAM_BASE: &str = "https://api.telegram.org";
/// Must exceed the server-side long-poll window used by `getUpdates`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// One entry of the `getUpdates` response.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// An inbound private message.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The account that sent an inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Thin Telegram Bot API client.
pub struct TelegramApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramApi {
    /// Creates an adapter for the given bot token.
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_base_url(TELEGRAM_BASE, token)
    }

    /// Creates an adapter against a custom endpoint, for tests.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .form(params)
            .send()
            .await?;
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.ok {
            anyhow::bail!(
                "{} failed: {}",
                method,
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("{} returned empty result", method))
    }

    /// Long-polls for new updates past `offset`. Blocks server-side for
    /// up to 30 seconds when there is nothing to deliver.
    pub async fn next_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &[
                ("offset", offset.to_string()),
                ("timeout", "30".to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ],
        )
        .await
    }

    fn parse_status(status: &str) -> MembershipStatus {
        match status {
            "creator" => MembershipStatus::Owner,
            "administrator" => MembershipStatus::Administrator,
            "member" => MembershipStatus::Member,
            "restricted" => MembershipStatus::Restricted,
            "kicked" => MembershipStatus::Banned,
            _ => MembershipStatus::Left,
        }
    }
}

#[async_trait]
impl MembershipCheck for TelegramApi {
    async fn membership(
        &self,
        user: &UserId,
        channel: &ChannelId,
    ) -> Result<MembershipStatus, MembershipQueryError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &[
                    ("chat_id", channel.0.clone()),
                    ("user_id", user.0.clone()),
                ],
            )
            .await
            .map_err(|e| MembershipQueryError(e.to_string()))?;
        Ok(Self::parse_status(&member.status))
    }
}

#[async_trait]
impl DeliverySink for TelegramApi {
    async fn deliver(
        &self,
        user: &UserId,
        text: &str,
        _has_active_mailbox: bool,
    ) -> anyhow::Result<Option<i64>> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &[
                    ("chat_id", user.0.clone()),
                    ("text", text.to_string()),
                    ("disable_web_page_preview", "true".to_string()),
                ],
            )
            .await?;
        tracing::debug!(%user, message_id = sent.message_id, "delivered message");
        Ok(Some(sent.message_id))
    }
}
