//! # SqlMux Connection
//!
//! Connection lifecycle orchestration for pluggable data providers.
//!
//! ## Architecture
//!
//! - **ConnectionManager**: drives connect, reconnect-on-token-expiry, disconnect,
//!   cancel and URI rename for every connection slot
//! - **CredentialResolver**: fills in stored passwords and bearer tokens
//! - **ConnectionStatusTable**: per-URI lifecycle records and completion hand-off
//! - **ProviderDispatcher**: routes calls to providers, waiting for late registration
//! - **PendingMap**: joins concurrent operations on the same URI

pub mod dependencies;
pub mod pool;

pub use dependencies::{DependenciesBuilder, ManagerDependencies};
pub use pool::{
    is_power_bi_server, ActiveConnection, CompletionSink, ConnectAttempt, ConnectDurations,
    ConnectionManager, ConnectionState, ConnectionStatusTable, ConnectionTarget,
    CredentialResolver, PendingMap, ProviderDispatcher,
};
