//! mail.tm REST client.
//!
//! Implements [`MailProvider`] against the mail.tm HTTP API:
//!
//! - `GET /domains` for provisioning (first listed domain is used)
//! - `POST /accounts` / `POST /token` for account and session creation
//! - `GET /messages?page=1`, `GET /messages/{id}`, `GET /sources/{id}`
//! - `DELETE /messages/{id}`
//!
//! All calls except account and token creation carry a bearer token. An
//! authentication-class failure triggers exactly one token re-exchange
//! followed by exactly one retry of the original call; a second failure
//! surfaces as a hard error.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{MailProvider, ProviderError, ProvisionedMailbox, Result};
use crate::domain::{MailboxSession, RemoteMessageFull, RemoteMessageSummary};

/// Public mail.tm API endpoint.
pub const MAILTM_BASE: &str = "https://api.mail.tm";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Hydra collection envelope used by mail.tm list endpoints.
#[derive(Debug, Deserialize)]
struct Hydra<T> {
    #[serde(rename = "hydra:member", default = "Vec::new")]
    member: Vec<T>,
}

/// One entry of the `GET /domains` listing.
#[derive(Debug, Deserialize)]
struct DomainEntry {
    domain: String,
}

/// `POST /token` response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// `GET /sources/{id}` response.
#[derive(Debug, Deserialize)]
struct SourceResponse {
    #[serde(default)]
    data: String,
}

/// Account or token creation payload.
#[derive(Debug, Serialize)]
struct CredentialPayload<'a> {
    address: &'a str,
    password: &'a str,
}

/// Runs `op` with the current token, refreshing the token and retrying
/// exactly once when the first attempt fails with an authentication-class
/// error. Any failure after the refresh is escalated to a hard error.
pub(crate) async fn retry_once_on_auth<T, Op, Fut, Re, ReFut>(
    token: &mut String,
    op: Op,
    reauth: Re,
) -> Result<T>
where
    Op: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
    Re: FnOnce() -> ReFut,
    ReFut: Future<Output = Result<String>>,
{
    match op(token.clone()).await {
        Err(err) if err.is_auth() => {
            tracing::debug!("session token rejected, exchanging credentials for a fresh one");
            *token = reauth().await.map_err(ProviderError::escalated)?;
            op(token.clone()).await.map_err(ProviderError::escalated)
        }
        other => other,
    }
}

/// mail.tm API client.
///
/// Stateless beyond the shared HTTP connection pool; credentials are
/// passed in per call via [`MailboxSession`].
pub struct MailTmClient {
    base_url: String,
    client: reqwest::Client,
}

impl MailTmClient {
    /// Creates a client against the public mail.tm endpoint.
    pub fn new() -> Result<Self> {
        Self::with_base_url(MAILTM_BASE)
    }

    /// Creates a client against a custom endpoint, primarily for tests
    /// and self-hosted deployments.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Exchanges address + password for a fresh session token.
    pub async fn authenticate(&self, address: &str, password: &str) -> Result<String> {
        let response: TokenResponse = self
            .post_json("/token", &CredentialPayload { address, password }, None)
            .await?;
        Ok(response.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T> {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn delete(&self, path: &str, token: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::Payload(e.to_string()))
    }

    /// Maps a non-success response to an error, classifying 401 as
    /// authentication-class. The body is kept verbatim, JSON or not.
    async fn status_error(response: reqwest::Response) -> ProviderError {
        let code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if code == 401 {
            ProviderError::Authentication(body)
        } else {
            ProviderError::Status { code, body }
        }
    }
}

#[async_trait]
impl MailProvider for MailTmClient {
    async fn provision_mailbox(
        &self,
        local_part: &str,
        password: &str,
    ) -> Result<ProvisionedMailbox> {
        let domains: Hydra<DomainEntry> = self.get_json("/domains", None).await?;
        let domain = domains
            .member
            .first()
            .map(|d| d.domain.clone())
            .ok_or_else(|| ProviderError::Provider("no domains available".to_string()))?;

        let address = format!("{local_part}@{domain}");
        let _account: serde_json::Value = self
            .post_json(
                "/accounts",
                &CredentialPayload {
                    address: &address,
                    password,
                },
                None,
            )
            .await?;

        let token = self.authenticate(&address, password).await?;
        tracing::info!(%address, "provisioned disposable mailbox");
        Ok(ProvisionedMailbox { address, token })
    }

    async fn list_messages(
        &self,
        session: &mut MailboxSession,
    ) -> Result<Vec<RemoteMessageSummary>> {
        let MailboxSession {
            address,
            password,
            token,
        } = session;
        retry_once_on_auth(
            token,
            |token| async move {
                let page: Hydra<RemoteMessageSummary> =
                    self.get_json("/messages?page=1", Some(&token)).await?;
                Ok(page.member)
            },
            || self.authenticate(address, password),
        )
        .await
    }

    async fn fetch_message(
        &self,
        session: &mut MailboxSession,
        message_id: &str,
    ) -> Result<RemoteMessageFull> {
        let MailboxSession {
            address,
            password,
            token,
        } = session;
        let path = format!("/messages/{message_id}");
        retry_once_on_auth(
            token,
            |token| {
                let path = path.clone();
                async move { self.get_json(&path, Some(&token)).await }
            },
            || self.authenticate(address, password),
        )
        .await
    }

    async fn fetch_source(&self, session: &mut MailboxSession, message_id: &str) -> Result<String> {
        let MailboxSession {
            address,
            password,
            token,
        } = session;
        let path = format!("/sources/{message_id}");
        retry_once_on_auth(
            token,
            |token| {
                let path = path.clone();
                async move {
                    let source: SourceResponse = self.get_json(&path, Some(&token)).await?;
                    Ok(source.data)
                }
            },
            || self.authenticate(address, password),
        )
        .await
    }

    async fn delete_message(&self, session: &mut MailboxSession, message_id: &str) -> Result<()> {
        let MailboxSession {
            address,
            password,
            token,
        } = session;
        let path = format!("/messages/{message_id}");
        retry_once_on_auth(
            token,
            |token| {
                let path = path.clone();
                async move { self.delete(&path, &token).await }
            },
            || self.authenticate(address, password),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    async fn flaky_op(
        token: String,
        calls: &AtomicUsize,
        failures_before_success: usize,
    ) -> Result<String> {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        if attempt < failures_before_success {
            Err(ProviderError::Authentication(format!(
                "rejected token {token}"
            )))
        } else {
            Ok(format!("ok with {token}"))
        }
    }

    #[tokio::test]
    async fn succeeds_without_reauth_when_token_valid() {
        let op_calls = AtomicUsize::new(0);
        let reauth_calls = AtomicUsize::new(0);
        let mut token = "valid".to_string();

        let result = retry_once_on_auth(
            &mut token,
            |t| flaky_op(t, &op_calls, 0),
            || async {
                reauth_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok with valid");
        assert_eq!(op_calls.load(Ordering::SeqCst), 1);
        assert_eq!(reauth_calls.load(Ordering::SeqCst), 0);
        assert_eq!(token, "valid");
    }

    #[tokio::test]
    async fn refreshes_and_retries_exactly_once_on_auth_failure() {
        let op_calls = AtomicUsize::new(0);
        let reauth_calls = AtomicUsize::new(0);
        let mut token = "stale".to_string();

        let result = retry_once_on_auth(
            &mut token,
            |t| flaky_op(t, &op_calls, 1),
            || async {
                reauth_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok with fresh");
        assert_eq!(op_calls.load(Ordering::SeqCst), 2);
        assert_eq!(reauth_calls.load(Ordering::SeqCst), 1);
        assert_eq!(token, "fresh");
    }

    #[tokio::test]
    async fn second_auth_failure_is_hard_error_with_single_reauth() {
        let op_calls = AtomicUsize::new(0);
        let reauth_calls = AtomicUsize::new(0);
        let mut token = "stale".to_string();

        let result = retry_once_on_auth(
            &mut token,
            |t| flaky_op(t, &op_calls, 2),
            || async {
                reauth_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_auth(), "escalated error must not be retryable");
        assert_eq!(op_calls.load(Ordering::SeqCst), 2);
        assert_eq!(reauth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_auth_failure_is_not_retried() {
        let op_calls = AtomicUsize::new(0);
        let reauth_calls = AtomicUsize::new(0);
        let mut token = "valid".to_string();

        let result: Result<String> = retry_once_on_auth(
            &mut token,
            |_t| async {
                op_calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Connection("timed out".to_string()))
            },
            || async {
                reauth_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            },
        )
        .await;

        assert!(matches!(result, Err(ProviderError::Connection(_))));
        assert_eq!(op_calls.load(Ordering::SeqCst), 1);
        assert_eq!(reauth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_reauth_surfaces_hard_error() {
        let op_calls = AtomicUsize::new(0);
        let mut token = "stale".to_string();

        let result: Result<String> = retry_once_on_auth(
            &mut token,
            |t| flaky_op(t, &op_calls, usize::MAX),
            || async { Err(ProviderError::Authentication("bad password".to_string())) },
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_auth());
        assert_eq!(op_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hydra_envelope_deserializes_member_list() {
        let json = r#"{"hydra:member": [{"domain": "example.test"}], "hydra:totalItems": 1}"#;
        let hydra: Hydra<DomainEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(hydra.member.len(), 1);
        assert_eq!(hydra.member[0].domain, "example.test");
    }

    #[test]
    fn hydra_envelope_tolerates_missing_member() {
        let hydra: Hydra<DomainEntry> = serde_json::from_str("{}").unwrap();
        assert!(hydra.member.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = MailTmClient::with_base_url("http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
    }
}
