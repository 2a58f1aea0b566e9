//! Result of a connect request

use serde::{Deserialize, Serialize};

use super::profile::ConnectionProfile;

/// Generic message shown instead of a raw provider error after remediation fails
pub const CONNECTION_NOT_ACCEPTED: &str = "Connection Not Accepted";

/// Why a connect attempt did not produce a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No password or token could be resolved
    CredentialUnavailable,
    /// The provider returned an error for the dial
    ProviderRejected,
    /// Provider rejection that firewall remediation claimed but did not fix
    FirewallBlocked,
    /// Provider reported failure without a message
    ConnectionNotAccepted,
}

/// User-visible failure details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFailure {
    pub message: String,
    pub code: Option<i32>,
    /// Verbose provider messages
    pub details: Option<String>,
    /// Raw provider error when `message` was replaced by a generic one
    pub provider_message: Option<String>,
    /// A collaborator already showed UI for this failure; callers should stay quiet
    pub handled: bool,
    pub kind: FailureKind,
}

impl ConnectFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
            provider_message: None,
            handled: false,
            kind,
        }
    }

    pub fn credential_unavailable() -> Self {
        Self::new(
            FailureKind::CredentialUnavailable,
            "No credentials available for connection",
        )
    }

    pub fn provider_rejected(message: impl Into<String>, code: Option<i32>) -> Self {
        Self {
            code,
            ..Self::new(FailureKind::ProviderRejected, message)
        }
    }

    pub fn not_accepted() -> Self {
        Self::new(FailureKind::ConnectionNotAccepted, CONNECTION_NOT_ACCEPTED)
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn handled(mut self) -> Self {
        self.handled = true;
        self
    }

    /// Swap the message for the generic one, keeping the raw provider text
    pub fn into_not_accepted(mut self, kind: FailureKind) -> Self {
        let raw = std::mem::replace(&mut self.message, CONNECTION_NOT_ACCEPTED.to_string());
        self.provider_message = Some(raw);
        self.kind = kind;
        self
    }
}

/// Terminal outcome of `connect`
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected {
        uri: String,
        profile: ConnectionProfile,
    },
    /// Connected on the retry that followed firewall-rule remediation
    ConnectedAfterRemediation {
        uri: String,
        profile: ConnectionProfile,
    },
    Rejected(ConnectFailure),
    /// Abandoned by the caller, or a collaborator handled the error without reconnecting
    Canceled,
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected { .. } | Self::ConnectedAfterRemediation { .. }
        )
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Connected { uri, .. } | Self::ConnectedAfterRemediation { uri, .. } => {
                Some(uri.as_str())
            }
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&ConnectionProfile> {
        match self {
            Self::Connected { profile, .. } | Self::ConnectedAfterRemediation { profile, .. } => {
                Some(profile)
            }
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ConnectFailure> {
        match self {
            Self::Rejected(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure().map(|f| f.message.as_str())
    }

    pub fn error_code(&self) -> Option<i32> {
        self.failure().and_then(|f| f.code)
    }

    /// Whether presentation code should stay quiet about this outcome
    pub fn is_handled(&self) -> bool {
        match self {
            Self::Rejected(failure) => failure.handled,
            _ => true,
        }
    }

    /// Mark a success as produced by the post-remediation retry
    pub fn after_remediation(self) -> Self {
        match self {
            Self::Connected { uri, profile } => Self::ConnectedAfterRemediation { uri, profile },
            other => other,
        }
    }
}
