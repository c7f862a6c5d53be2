//! Service layer: mailbox lifecycle, access gating, user registry,
//! background polling, and command orchestration over the provider and
//! storage seams.

pub mod gate_service;
pub mod mailbox_service;
pub mod notifier_service;
pub mod registry_service;
pub mod relay_service;

pub use gate_service::GateService;
pub use mailbox_service::{FetchOutcome, MailboxError, MailboxService};
pub use notifier_service::{NotifierService, NotifierSettings, TickReport};
pub use registry_service::{RegistryStats, UserRegistry};
pub use relay_service::{Caller, RelayService, RelaySettings};
