//! Augury service: the event relay, the CID content store and the NIP-96
//! upload gateway, served together over one HTTP listener.
//!
//! - Configuration (TOML or JSON file)
//! - Database (SQLite events, tag index, content metadata and owners)
//! - Content store (uploaded files named by CID)
//! - Relay (subscriptions and live fan-out)
//! - HTTP handlers (WebSocket upgrade, CID virtual hosts, NIP-96, health)

pub mod config;
pub mod database;
pub mod http;
pub mod process;
pub mod relay;
pub mod sniff;
pub mod state;
pub mod storage;

pub use config::{Config, ConfigError, ConfigFile};
pub use database::{Database, DatabaseSetupError};
pub use relay::Relay;
pub use state::{State as ServiceState, StateSetupError};
pub use storage::{ContentStore, StorageError};
