//! Connection pool - per-URI connection lifecycle
//!
//! - **CredentialResolver**: passwords from the store, tokens from the account service
//! - **ConnectionStatusTable**: in-memory status entries keyed by URI
//! - **ProviderDispatcher**: provider registry with readiness waiting
//! - **ConnectionManager**: the connect state machine and remediation retries

mod attempt;
mod credential;
mod dispatcher;
mod manager;
mod pending;
mod status;

pub use attempt::ConnectAttempt;
pub use credential::{is_power_bi_server, CredentialResolver, PasswordResolution};
pub use dispatcher::ProviderDispatcher;
pub use manager::{CompletionSink, ConnectionManager, ConnectionTarget};
pub use pending::PendingMap;
pub use status::{
    ActiveConnection, AttemptTicket, Completion, CompletionDelivery, ConnectDurations,
    ConnectionState, ConnectionStatusTable, ProfileIdentity,
};
