//! Chat transport collaborator interfaces.
//!
//! The access gate and the delivery hand-off are the only two surfaces
//! the core shares with the chat transport. Both are traits here, with a
//! thin Telegram Bot API adapter as the production implementation.

mod telegram;
mod traits;

pub use telegram::{IncomingMessage, Sender, TelegramApi, Update};
pub use traits::{DeliverySink, MembershipCheck, MembershipQueryError, MembershipStatus};
