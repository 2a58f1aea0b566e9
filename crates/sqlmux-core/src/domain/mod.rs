//! Domain entities for connection management

mod account;
mod event;
mod options;
mod outcome;
mod profile;
mod provider;
mod uri;

pub use account::{Account, AccountKey, AzureResource, SecurityToken};
pub use event::DomainEvent;
pub use options::{ConnectOptions, ConnectionType, DialogParams, ProfileMatcher};
pub use outcome::{ConnectFailure, ConnectOutcome, FailureKind, CONNECTION_NOT_ACCEPTED};
pub use profile::{option_keys, AuthenticationType, ConnectionProfile};
pub use provider::{
    ChangedConnectionInfo, ConnectionInfo, ConnectionInfoSummary, ConnectionSummary,
    ListDatabasesResult, PasswordChangeResult, ProviderProperties, ServerInfo,
};
pub use uri::{generate_uri, ConnectionPurpose};
