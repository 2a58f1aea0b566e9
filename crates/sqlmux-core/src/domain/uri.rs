//! Connection URI synthesis
//!
//! A URI is the manager's key for a logical connection slot. When the caller
//! does not supply one (an editor id, for example) it is derived from the
//! profile fingerprint plus a purpose prefix, so repeated requests for the same
//! profile and purpose land on the same slot.

use serde::{Deserialize, Serialize};

use super::profile::ConnectionProfile;

/// Why a connection is being opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPurpose {
    #[default]
    Connection,
    Dashboard,
    Insights,
    Notebook,
}

impl ConnectionPurpose {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Connection => "connection:",
            Self::Dashboard => "dashboard:",
            Self::Insights => "insights:",
            Self::Notebook => "notebook:",
        }
    }

    /// Recover the purpose from a synthesized URI; caller-supplied URIs yield `None`
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::Connection,
            Self::Dashboard,
            Self::Insights,
            Self::Notebook,
        ]
        .into_iter()
        .find(|p| uri.starts_with(p.prefix()))
    }
}

/// Deterministic URI for a profile and purpose
pub fn generate_uri(profile: &ConnectionProfile, purpose: ConnectionPurpose) -> String {
    format!("{}{}", purpose.prefix(), profile.fingerprint())
}
