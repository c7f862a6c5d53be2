//! External service integrations.
//!
//! - [`mail`] - disposable-mail provider (mail.tm REST)
//! - [`chat`] - chat transport collaborator interfaces (membership
//!   checks and message delivery)

pub mod chat;
pub mod mail;
