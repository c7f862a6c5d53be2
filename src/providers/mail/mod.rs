//! Disposable-mail provider implementations.
//!
//! This module contains the [`MailProvider`] trait and the mail.tm REST
//! implementation. The mailbox service depends only on the trait, so
//! tests substitute scripted stub providers.

mod mailtm;
mod traits;

pub use mailtm::{MailTmClient, DEFAULT_TIMEOUT, MAILTM_BASE};
pub use traits::{MailProvider, ProviderError, ProvisionedMailbox, Result};
