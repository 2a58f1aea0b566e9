//! Persisted connection store contract
//!
//! Saved and recent profiles, server groups and secure credential storage
//! live behind this trait; the connection manager never touches storage
//! directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionProfile, ProfileMatcher};

/// Result type for store operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Profile with any stored password filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPasswordResult {
    pub profile: ConnectionProfile,
    /// A password was found in secure storage
    pub saved_cred: bool,
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Fill in the stored password; an explicitly supplied password is left untouched
    async fn add_saved_password(&self, profile: &ConnectionProfile)
        -> RepoResult<SavedPasswordResult>;

    /// Whether connecting with this profile needs a password
    fn is_password_required(&self, profile: &ConnectionProfile) -> bool;

    /// Persist a profile, replacing the one selected by `matcher` when given.
    /// Returns the saved profile, which carries a store-assigned id.
    async fn save_profile(
        &self,
        profile: &ConnectionProfile,
        matcher: Option<&ProfileMatcher>,
    ) -> RepoResult<ConnectionProfile>;

    async fn save_password(&self, profile: &ConnectionProfile) -> RepoResult<bool>;

    async fn add_recent_connection(&self, profile: &ConnectionProfile) -> RepoResult<()>;

    /// Whether saving this edit would duplicate another saved profile
    async fn is_duplicate_edit(
        &self,
        profile: &ConnectionProfile,
        matcher: &ProfileMatcher,
    ) -> RepoResult<bool>;

    async fn delete_connection(&self, profile: &ConnectionProfile) -> RepoResult<()>;
}
