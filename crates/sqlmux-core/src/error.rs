//! Connection error taxonomy
//!
//! Collaborators (store, providers, dialogs) report failures through
//! `anyhow::Result`; the manager maps them onto [`ConnectionError`] so that
//! deduplicated futures can hand the same error value to every waiter.

/// Result alias used by the connection manager
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised by connection management.
///
/// Credential and remediation failures are not represented here; they are
/// recovered into boolean results or a rejected connect outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// No password or token could be resolved for the profile.
    #[error("no credentials available for connection to {server}")]
    CredentialUnavailable { server: String },

    /// The provider rejected the dial.
    #[error("connection rejected by provider: {message}")]
    ProviderRejected { message: String, code: Option<i32> },

    /// An operation targeted a URI with no provider association.
    #[error("no provider is associated with uri {0}")]
    UnknownProviderForUri(String),

    /// An operation named a provider id that was never declared or registered.
    #[error("provider \"{0}\" is not registered")]
    UnknownProvider(String),

    /// A provider implementation registered twice.
    #[error("provider \"{0}\" is already registered")]
    ProviderAlreadyRegistered(String),

    /// The provider did not become ready within the configured timeout.
    #[error("provider \"{provider_id}\" not ready after {waited_secs}s")]
    ProviderNotReady { provider_id: String, waited_secs: u64 },

    /// A live status entry for the URI belongs to a different profile.
    #[error("uri {0} is already in use by a different connection")]
    UriInUse(String),

    /// A token-refresh reconnect did not produce a connection.
    #[error("failed to refresh account token for connection {uri}: {reason}")]
    TokenRefreshFailed { uri: String, reason: String },

    /// An edited profile collides with another saved profile in the same group.
    #[error("cannot save profile, it matches an existing profile with the same server info in group {group}: {key}")]
    DuplicateEdit { key: String, group: String },

    /// The persisted connection store failed.
    #[error("connection store error: {0}")]
    Store(String),

    /// A provider call failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The connection dialog failed.
    #[error("connection dialog error: {0}")]
    Dialog(String),
}

impl ConnectionError {
    /// Errors that indicate the caller violated the API contract
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownProviderForUri(_)
                | Self::UnknownProvider(_)
                | Self::ProviderAlreadyRegistered(_)
                | Self::UriInUse(_)
        )
    }
}

/// Map collaborator failures onto [`ConnectionError`]
pub trait ConnectionResultExt<T> {
    fn store_err(self) -> ConnectionResult<T>;
    fn provider_err(self) -> ConnectionResult<T>;
    fn dialog_err(self) -> ConnectionResult<T>;
}

impl<T> ConnectionResultExt<T> for anyhow::Result<T> {
    fn store_err(self) -> ConnectionResult<T> {
        self.map_err(|e| ConnectionError::Store(format!("{:#}", e)))
    }

    fn provider_err(self) -> ConnectionResult<T> {
        self.map_err(|e| ConnectionError::Provider(format!("{:#}", e)))
    }

    fn dialog_err(self) -> ConnectionResult<T> {
        self.map_err(|e| ConnectionError::Dialog(format!("{:#}", e)))
    }
}
