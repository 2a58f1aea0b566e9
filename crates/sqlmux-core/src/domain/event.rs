//! Domain Events - connection lifecycle notifications
//!
//! Emitted by the connection manager and consumed by presentation code
//! (editors, dashboards, object explorer) through the event bus.
//!
//! Events serialize with a `type` field containing the snake_case variant name:
//! ```json
//! { "type": "connected", "uri": "...", "profile": { ... } }
//! ```

use serde::{Deserialize, Serialize};

use super::options::DialogParams;
use super::profile::ConnectionProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ════════════════════════════════════════════════════════════════════════
    // CONNECT ATTEMPT
    // ════════════════════════════════════════════════════════════════════════
    /// A connect attempt for `uri` began
    ConnectStarted { uri: String },

    /// The attempt produced a live connection
    ConnectSucceeded {
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<DialogParams>,
        profile: ConnectionProfile,
    },

    /// The attempt failed
    ConnectRejected {
        uri: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },

    /// A collaborator handled the failure without reconnecting
    ConnectCanceled { uri: String },

    /// The provider accepted a connect request (the dial is still in progress)
    ConnectRequestSent {
        uri: String,
        provider_id: String,
    },

    // ════════════════════════════════════════════════════════════════════════
    // CONNECTION STATE
    // ════════════════════════════════════════════════════════════════════════
    /// A connection is live and all post-connect actions completed
    Connected {
        uri: String,
        profile: ConnectionProfile,
    },

    Disconnected {
        uri: String,
        profile: ConnectionProfile,
    },

    /// The provider reported a change of server/database/user on a live connection
    ConnectionChanged {
        uri: String,
        profile: ConnectionProfile,
    },

    LanguageFlavorChanged {
        uri: String,
        language: String,
        flavor: String,
    },

    /// Connected server version is outside the supported range (reported once per profile)
    UnsupportedServerVersion {
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // SAVED PROFILES
    // ════════════════════════════════════════════════════════════════════════
    ConnectionProfileAdded { profile: ConnectionProfile },

    /// A profile was created through the dialog and saved on first connect
    ConnectionProfileCreated { profile: ConnectionProfile },

    ConnectionProfileEdited {
        old_profile_id: String,
        profile: ConnectionProfile,
    },

    /// An existing saved profile was connected (no dialog involved)
    ConnectionProfileConnected { profile: ConnectionProfile },

    ConnectionProfileDeleted { profile: ConnectionProfile },
}

impl DomainEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ConnectStarted { .. } => "connect_started",
            Self::ConnectSucceeded { .. } => "connect_succeeded",
            Self::ConnectRejected { .. } => "connect_rejected",
            Self::ConnectCanceled { .. } => "connect_canceled",
            Self::ConnectRequestSent { .. } => "connect_request_sent",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::LanguageFlavorChanged { .. } => "language_flavor_changed",
            Self::UnsupportedServerVersion { .. } => "unsupported_server_version",
            Self::ConnectionProfileAdded { .. } => "connection_profile_added",
            Self::ConnectionProfileCreated { .. } => "connection_profile_created",
            Self::ConnectionProfileEdited { .. } => "connection_profile_edited",
            Self::ConnectionProfileConnected { .. } => "connection_profile_connected",
            Self::ConnectionProfileDeleted { .. } => "connection_profile_deleted",
        }
    }

    /// Get the uri if this event is scoped to a connection slot
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::ConnectStarted { uri }
            | Self::ConnectSucceeded { uri, .. }
            | Self::ConnectRejected { uri, .. }
            | Self::ConnectCanceled { uri }
            | Self::ConnectRequestSent { uri, .. }
            | Self::Connected { uri, .. }
            | Self::Disconnected { uri, .. }
            | Self::ConnectionChanged { uri, .. }
            | Self::LanguageFlavorChanged { uri, .. }
            | Self::UnsupportedServerVersion { uri, .. } => Some(uri),
            Self::ConnectionProfileAdded { .. }
            | Self::ConnectionProfileCreated { .. }
            | Self::ConnectionProfileEdited { .. }
            | Self::ConnectionProfileConnected { .. }
            | Self::ConnectionProfileDeleted { .. } => None,
        }
    }

    /// Check if this event reports a change to saved profiles
    pub fn is_profile_event(&self) -> bool {
        matches!(
            self,
            Self::ConnectionProfileAdded { .. }
                | Self::ConnectionProfileCreated { .. }
                | Self::ConnectionProfileEdited { .. }
                | Self::ConnectionProfileConnected { .. }
                | Self::ConnectionProfileDeleted { .. }
        )
    }
}
