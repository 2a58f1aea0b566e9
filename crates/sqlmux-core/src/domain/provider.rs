//! Payloads exchanged with connection providers
//!
//! A provider's `connect` call is fire-and-forget; the real result arrives
//! later as a [`ConnectionInfoSummary`] pushed back to the manager.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::account::AzureResource;

/// Options handed to a provider for a connect request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub options: BTreeMap<String, Value>,
}

impl ConnectionInfo {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

/// Server facts reported on a successful connect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerInfo {
    pub server_version: String,
    pub server_edition: String,
    pub is_cloud: bool,
    pub engine_edition_id: Option<i32>,
    pub options: BTreeMap<String, Value>,
}

/// Effective connection target reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSummary {
    pub server_name: String,
    pub database_name: String,
    pub user_name: String,
}

/// Connection-complete notification
///
/// Absence of `connection_id` means the attempt failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionInfoSummary {
    pub owner_uri: String,
    pub connection_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<i32>,
    /// Verbose provider messages (stack, inner errors)
    pub messages: Option<String>,
    pub server_info: Option<ServerInfo>,
    pub connection_summary: Option<ConnectionSummary>,
    pub is_supported_version: Option<bool>,
    pub unsupported_version_message: Option<String>,
}

impl ConnectionInfoSummary {
    pub fn success(owner_uri: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            owner_uri: owner_uri.into(),
            connection_id: Some(connection_id.into()),
            ..Default::default()
        }
    }

    pub fn failure(
        owner_uri: impl Into<String>,
        message: impl Into<String>,
        code: Option<i32>,
    ) -> Self {
        Self {
            owner_uri: owner_uri.into(),
            error_message: Some(message.into()),
            error_code: code,
            ..Default::default()
        }
    }

    pub fn with_server_info(mut self, info: ServerInfo) -> Self {
        self.server_info = Some(info);
        self
    }

    pub fn with_summary(mut self, summary: ConnectionSummary) -> Self {
        self.connection_summary = Some(summary);
        self
    }

    pub fn is_success(&self) -> bool {
        self.connection_id.is_some()
    }
}

/// Pushed when the provider observes the target of a live connection change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedConnectionInfo {
    pub connection_uri: String,
    pub connection: ConnectionSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatabasesResult {
    pub database_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeResult {
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Metadata a provider declares before (or while) its implementation registers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderProperties {
    pub provider_id: String,
    pub display_name: String,
    /// Resource tokens for this provider are scoped to; `None` means undeclared
    pub azure_resource: Option<AzureResource>,
    /// Whether the provider exposes an authentication-type connection option
    pub supports_auth_type_option: bool,
}

impl ProviderProperties {
    pub fn new(provider_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        Self {
            display_name: provider_id.clone(),
            provider_id,
            azure_resource: None,
            supports_auth_type_option: false,
        }
    }

    pub fn with_azure_resource(mut self, resource: AzureResource) -> Self {
        self.azure_resource = Some(resource);
        self
    }

    pub fn with_auth_type_option(mut self) -> Self {
        self.supports_auth_type_option = true;
        self
    }
}
