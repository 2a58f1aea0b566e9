//! Caller options for a connect request

use serde::{Deserialize, Serialize};

use super::profile::ConnectionProfile;

/// Kind of surface that owns a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    Default,
    Editor,
    Temporary,
}

/// Context passed to the connection dialog and used to detect edit flows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogParams {
    pub connection_type: ConnectionType,
    pub uri: Option<String>,
    /// Saving replaces the profile identified by `old_profile_id`
    pub is_edit_connection: bool,
    pub old_profile_id: Option<String>,
    pub show_dashboard: bool,
}

impl DialogParams {
    pub fn edit_of(old_profile_id: impl Into<String>) -> Self {
        Self {
            is_edit_connection: true,
            old_profile_id: Some(old_profile_id.into()),
            ..Default::default()
        }
    }
}

/// How the store identifies the saved profile a save should replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileMatcher {
    /// Replace the profile whose id equals the profile being edited
    EditOf { old_profile_id: String },
}

impl ProfileMatcher {
    pub fn matches(&self, saved: &ConnectionProfile) -> bool {
        match self {
            Self::EditOf { old_profile_id } => saved.id.as_deref() == Some(old_profile_id.as_str()),
        }
    }
}

/// Options for `connect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    /// Persist the profile (and add it to recent connections) on success
    pub save_the_connection: bool,
    pub show_dashboard: bool,
    /// Open the connection dialog when credentials are missing or the dial fails
    pub show_connection_dialog_on_error: bool,
    /// Try firewall-rule remediation when the provider rejects with an error code
    pub show_firewall_rule_on_error: bool,
    pub params: Option<DialogParams>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            save_the_connection: false,
            show_dashboard: false,
            show_connection_dialog_on_error: false,
            show_firewall_rule_on_error: true,
            params: None,
        }
    }
}

impl ConnectOptions {
    /// Defaults used when saving a profile submitted from the dialog
    pub fn save_profile() -> Self {
        Self {
            save_the_connection: true,
            ..Default::default()
        }
    }

    /// Full interactive recovery: dialog and firewall handling on
    pub fn interactive() -> Self {
        Self {
            show_connection_dialog_on_error: true,
            ..Default::default()
        }
    }

    pub fn with_save(mut self, save: bool) -> Self {
        self.save_the_connection = save;
        self
    }

    pub fn with_dialog_on_error(mut self, enabled: bool) -> Self {
        self.show_connection_dialog_on_error = enabled;
        self
    }

    pub fn with_firewall_on_error(mut self, enabled: bool) -> Self {
        self.show_firewall_rule_on_error = enabled;
        self
    }

    pub fn with_params(mut self, params: DialogParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn is_edit(&self) -> bool {
        self.params
            .as_ref()
            .map(|p| p.is_edit_connection)
            .unwrap_or(false)
    }

    /// Matcher for edit flows; `None` when creating a new profile
    pub fn edit_matcher(&self) -> Option<ProfileMatcher> {
        let params = self.params.as_ref()?;
        if !params.is_edit_connection {
            return None;
        }
        Some(ProfileMatcher::EditOf {
            old_profile_id: params.old_profile_id.clone().unwrap_or_default(),
        })
    }
}
