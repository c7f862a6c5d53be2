//! Runtime settings, read from the environment at startup.
//!
//! Required keys make startup fail with a clear message; everything
//! else falls back to a sensible default.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use anyhow::Context;

const ENV_BOT_TOKEN: &str = "BURNBOX_BOT_TOKEN";
const ENV_CHANNEL_PRIMARY: &str = "BURNBOX_CHANNEL_PRIMARY";
const ENV_CHANNEL_SECONDARY: &str = "BURNBOX_CHANNEL_SECONDARY";
const ENV_INVITE_PRIMARY: &str = "BURNBOX_INVITE_PRIMARY";
const ENV_INVITE_SECONDARY: &str = "BURNBOX_INVITE_SECONDARY";
const ENV_ADMIN_ID: &str = "BURNBOX_ADMIN_ID";
const ENV_POLL_SECONDS: &str = "BURNBOX_POLL_SECONDS";
const ENV_NOTIFIER_ENABLED: &str = "BURNBOX_NOTIFIER_ENABLED";
const ENV_PROVIDER_BASE_URL: &str = "BURNBOX_PROVIDER_BASE_URL";
const ENV_STATE_PATH: &str = "BURNBOX_STATE_PATH";
const ENV_USERS_PATH: &str = "BURNBOX_USERS_PATH";

/// Top-level runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Chat transport configuration.
    pub transport: TransportSettings,
    /// Access gate channel configuration.
    pub gate: GateSettings,
    /// Background poller configuration.
    pub notifier: NotifierSettings,
    /// Mail provider endpoint configuration.
    pub provider: ProviderSettings,
    /// Persisted document locations.
    pub storage: StorageSettings,
}

/// Chat transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Bot API token.
    pub bot_token: String,
    /// User id allowed to run admin commands, if any.
    pub admin_id: Option<String>,
}

/// The two channels a user must belong to, with the invite links shown
/// when they do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    /// Primary channel id.
    pub primary_channel: String,
    /// Secondary channel id.
    pub secondary_channel: String,
    /// Invite links shown alongside the join prompt.
    pub invite_links: Vec<String>,
}

/// Background poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Master switch for background notifications.
    pub enabled: bool,
    /// Seconds between polling passes.
    pub poll_seconds: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_seconds: 15,
        }
    }
}

/// Mail provider endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of the mail.tm-compatible API.
    pub base_url: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: crate::providers::mail::MAILTM_BASE.to_string(),
        }
    }
}

/// Persisted document locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Mailbox records document.
    pub state_path: PathBuf,
    /// User profiles document.
    pub users_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("state.json"),
            users_path: PathBuf::from("users.json"),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment. Missing required
    /// keys produce an error that names the key.
    pub fn from_env() -> anyhow::Result<Self> {
        let transport = TransportSettings {
            bot_token: required(ENV_BOT_TOKEN)?,
            admin_id: optional(ENV_ADMIN_ID),
        };

        let mut invite_links = Vec::new();
        if let Some(link) = optional(ENV_INVITE_PRIMARY) {
            invite_links.push(link);
        }
        if let Some(link) = optional(ENV_INVITE_SECONDARY) {
            invite_links.push(link);
        }
        let gate = GateSettings {
            primary_channel: required(ENV_CHANNEL_PRIMARY)?,
            secondary_channel: required(ENV_CHANNEL_SECONDARY)?,
            invite_links,
        };

        let defaults = NotifierSettings::default();
        let notifier = NotifierSettings {
            enabled: match optional(ENV_NOTIFIER_ENABLED) {
                Some(raw) => parse_bool(ENV_NOTIFIER_ENABLED, &raw)?,
                None => defaults.enabled,
            },
            poll_seconds: match optional(ENV_POLL_SECONDS) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("{ENV_POLL_SECONDS} must be an integer, got {raw:?}"))?,
                None => defaults.poll_seconds,
            },
        };

        let provider = ProviderSettings {
            base_url: optional(ENV_PROVIDER_BASE_URL)
                .unwrap_or_else(|| ProviderSettings::default().base_url),
        };

        let storage_defaults = StorageSettings::default();
        let storage = StorageSettings {
            state_path: optional(ENV_STATE_PATH)
                .map(PathBuf::from)
                .unwrap_or(storage_defaults.state_path),
            users_path: optional(ENV_USERS_PATH)
                .map(PathBuf::from)
                .unwrap_or(storage_defaults.users_path),
        };

        Ok(Self {
            transport,
            gate,
            notifier,
            provider,
            storage,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    optional(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{key} must be a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_defaults() {
        let settings = NotifierSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.poll_seconds, 15);
    }

    #[test]
    fn storage_defaults_mirror_the_two_document_layout() {
        let settings = StorageSettings::default();
        assert_eq!(settings.state_path, PathBuf::from("state.json"));
        assert_eq!(settings.users_path, PathBuf::from("users.json"));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }
}
