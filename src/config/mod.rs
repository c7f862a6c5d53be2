//! Configuration and settings management.
//!
//! Settings are read from environment variables at startup; missing
//! required keys abort the process with a message naming the key.

mod settings;

pub use settings::{
    GateSettings, NotifierSettings, ProviderSettings, Settings, StorageSettings,
    TransportSettings,
};
