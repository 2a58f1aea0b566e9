//! Connection profile entity - describes a target data engine and its credentials
//!
//! Well-known connection properties are typed fields; everything else a
//! provider understands travels in the `options` bag, which is also where
//! resolved bearer tokens are stored before a connect request is sent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::ConnectionInfo;

/// Option bag keys written by the connection manager
pub mod option_keys {
    pub const AZURE_ACCOUNT_TOKEN: &str = "azureAccountToken";
    pub const EXPIRES_ON: &str = "expiresOn";
    pub const PASSWORD: &str = "password";
    pub const GROUP_ID: &str = "groupId";
    pub const DATABASE_DISPLAY_NAME: &str = "databaseDisplayName";
    pub const ORIGINAL_DATABASE: &str = "originalDatabase";
    pub const IS_CLOUD: &str = "isCloud";
    pub const SERVER_VERSION: &str = "serverVersion";
    pub const SERVER: &str = "server";
    pub const DATABASE: &str = "database";
    pub const USER: &str = "user";
    pub const AUTHENTICATION_TYPE: &str = "authenticationType";
}

/// Authentication kind for a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthenticationType {
    /// Windows/Kerberos integrated authentication
    Integrated,
    /// Username + password
    SqlLogin,
    /// Interactive Azure AD (MFA) with a cached account
    AzureMfa,
    /// Azure AD with an explicit user name
    AzureMfaAndUser,
    /// Delegated token authentication (dSTS)
    DstsAuth,
    /// No authentication
    None,
    /// Provider-specific kind the manager does not interpret
    Other(String),
}

impl AuthenticationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Integrated => "Integrated",
            Self::SqlLogin => "SqlLogin",
            Self::AzureMfa => "AzureMFA",
            Self::AzureMfaAndUser => "AzureMFAAndUser",
            Self::DstsAuth => "dstsAuth",
            Self::None => "None",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Whether connecting with this kind requires a bearer token
    pub fn requires_token(&self) -> bool {
        matches!(self, Self::AzureMfa | Self::AzureMfaAndUser | Self::DstsAuth)
    }

    /// Interactive Azure kinds resolve the token from a cached Azure account
    pub fn is_azure_interactive(&self) -> bool {
        matches!(self, Self::AzureMfa | Self::AzureMfaAndUser)
    }
}

impl From<&str> for AuthenticationType {
    fn from(s: &str) -> Self {
        match s {
            "Integrated" => Self::Integrated,
            "SqlLogin" => Self::SqlLogin,
            "AzureMFA" => Self::AzureMfa,
            "AzureMFAAndUser" => Self::AzureMfaAndUser,
            "dstsAuth" => Self::DstsAuth,
            "None" => Self::None,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for AuthenticationType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<AuthenticationType> for String {
    fn from(value: AuthenticationType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection profile
///
/// Compared by `id` once the profile has been persisted, otherwise by its
/// fingerprint (provider + server + database + user + auth type + group).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionProfile {
    /// Stable id assigned by the connection store once saved
    pub id: Option<String>,
    /// Provider id (e.g. "MSSQL", "PGSQL")
    pub provider_name: String,
    pub server_name: String,
    pub database_name: String,
    pub user_name: String,
    /// Plaintext password; empty when not supplied
    pub password: String,
    pub authentication_type: Option<AuthenticationType>,
    /// Azure account id used by interactive Azure auth kinds
    pub azure_account: Option<String>,
    pub azure_tenant_id: Option<String>,
    pub group_id: Option<String>,
    pub group_full_name: Option<String>,
    pub save_password: bool,
    pub save_profile: bool,
    /// Arbitrary provider options
    pub options: BTreeMap<String, Value>,
}

impl ConnectionProfile {
    /// Create a profile for a provider and server
    pub fn new(provider_name: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            server_name: server_name.into(),
            save_profile: true,
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database_name = database.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user_name = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthenticationType) -> Self {
        self.authentication_type = Some(auth);
        self
    }

    pub fn with_azure_account(mut self, account: impl Into<String>) -> Self {
        self.azure_account = Some(account.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.azure_tenant_id = Some(tenant.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Identity key derived from the connection target.
    ///
    /// Empty segments are omitted so a profile with and without an explicit
    /// group maps to different keys only when a group is actually set.
    pub fn fingerprint(&self) -> String {
        let auth = self
            .authentication_type
            .as_ref()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();
        let group = self.group_id.clone().unwrap_or_default();
        let segments = [
            ("providerName", self.provider_name.as_str()),
            ("server", self.server_name.as_str()),
            ("database", self.database_name.as_str()),
            ("user", self.user_name.as_str()),
            ("authenticationType", auth.as_str()),
            ("groupId", group.as_str()),
        ];
        segments
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Same logical connection: by id when both sides are persisted, else by fingerprint
    pub fn matches(&self, other: &ConnectionProfile) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.fingerprint() == other.fingerprint(),
        }
    }

    pub fn requires_token(&self) -> bool {
        self.authentication_type
            .as_ref()
            .map(AuthenticationType::requires_token)
            .unwrap_or(false)
    }

    /// Resolved bearer token, if any
    pub fn access_token(&self) -> Option<&str> {
        self.options
            .get(option_keys::AZURE_ACCOUNT_TOKEN)
            .and_then(Value::as_str)
    }

    /// Token expiry as unix seconds, if a numeric expiry is recorded
    pub fn token_expires_on(&self) -> Option<i64> {
        self.options
            .get(option_keys::EXPIRES_ON)
            .and_then(Value::as_i64)
    }

    /// Store a bearer token and drop any plaintext password
    pub fn set_access_token(&mut self, token: impl Into<String>, expires_on: Option<i64>) {
        self.options.insert(
            option_keys::AZURE_ACCOUNT_TOKEN.to_string(),
            Value::String(token.into()),
        );
        match expires_on {
            Some(exp) => {
                self.options
                    .insert(option_keys::EXPIRES_ON.to_string(), Value::from(exp));
            }
            None => {
                self.options.remove(option_keys::EXPIRES_ON);
            }
        }
        self.password.clear();
        self.options.insert(
            option_keys::PASSWORD.to_string(),
            Value::String(String::new()),
        );
    }

    /// Seconds until the stored token expires, relative to now
    pub fn token_seconds_remaining(&self) -> Option<i64> {
        self.token_expires_on()
            .map(|exp| exp - chrono::Utc::now().timestamp())
    }

    /// Assign a fresh id if the profile has none; returns the id
    pub fn ensure_id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .as_str()
    }

    pub fn clear_access_token(&mut self) {
        self.options.remove(option_keys::AZURE_ACCOUNT_TOKEN);
        self.options.remove(option_keys::EXPIRES_ON);
    }

    /// Build the payload sent to a provider's connect call
    pub fn to_connection_info(&self) -> ConnectionInfo {
        let mut options = self.options.clone();
        options.insert(
            option_keys::SERVER.to_string(),
            Value::String(self.server_name.clone()),
        );
        options.insert(
            option_keys::DATABASE.to_string(),
            Value::String(self.database_name.clone()),
        );
        options.insert(
            option_keys::USER.to_string(),
            Value::String(self.user_name.clone()),
        );
        options.insert(
            option_keys::PASSWORD.to_string(),
            Value::String(self.password.clone()),
        );
        if let Some(auth) = &self.authentication_type {
            options.insert(
                option_keys::AUTHENTICATION_TYPE.to_string(),
                Value::String(auth.as_str().to_string()),
            );
        }
        ConnectionInfo { options }
    }
}
