//! # SqlMux Core Library
//!
//! Domain types and collaborator contracts for SqlMux connection management.
//!
//! ## Modules
//!
//! - `domain` - Core entities (ConnectionProfile, Account, provider payloads, outcomes)
//! - `repository` - Persisted connection store trait
//! - `service` - Collaborator traits (providers, accounts, dialogs, firewall remediation)
//! - `event_bus` - Central event distribution system
//! - `settings` - Connection manager configuration
//! - `logging` - Tracing subscriber setup for binaries and tests
//! - `error` - Connection error taxonomy

pub mod domain;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod repository;
pub mod service;
pub mod settings;

// Re-export commonly used types
pub use domain::*;
pub use error::{ConnectionError, ConnectionResult, ConnectionResultExt};
pub use repository::*;
pub use service::*;
pub use settings::ManagerSettings;

// Event-driven architecture exports
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
