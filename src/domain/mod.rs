//! Domain layer types for the burnbox relay.
//!
//! This module contains the core domain types used throughout the
//! application: mailbox records, user profiles, transient provider
//! message types, and identifier newtypes.

mod mailbox;
mod message;
mod types;
mod user;

pub use mailbox::{MailboxRecord, MailboxSession};
pub use message::{
    RemoteAddress, RemoteMessageFull, RemoteMessageSummary, RenderedMessage, NO_BODY_PLACEHOLDER,
    NO_SUBJECT_PLACEHOLDER,
};
pub use types::{ChannelId, UserId};
pub use user::UserProfile;
