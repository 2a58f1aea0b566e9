//! Cached identity accounts and the tokens issued for them

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider-id prefix carried by delegated (dSTS) accounts
pub const DSTS_PROVIDER_PREFIX: &str = "dstsAuth";
/// Provider-id prefix carried by Azure AD accounts
pub const AZURE_PROVIDER_PREFIX: &str = "azure";

/// Resource a security token is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AzureResource {
    ResourceManagement,
    /// Generic database resource
    #[default]
    Sql,
    OssRdbms,
    AzureKeyVault,
    Graph,
    MicrosoftResourceManagement,
    AzureDevOps,
    MsGraph,
    AzureLogAnalytics,
    AzureStorage,
    AzureKusto,
    PowerBi,
    Custom,
}

/// Identifies an account within an account provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    /// Account provider id, e.g. `azure_publicCloud` or `dstsAuth_...`
    pub provider_id: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_args: Option<Value>,
}

/// A cached account as returned by the account management service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub key: AccountKey,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Stale accounts must be refreshed before a token can be requested
    #[serde(default)]
    pub is_stale: bool,
}

impl Account {
    pub fn new(provider_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        Self {
            key: AccountKey {
                provider_id: provider_id.into(),
                account_id: account_id.clone(),
                provider_args: None,
            },
            display_name: account_id,
            email: None,
            is_stale: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn stale(mut self) -> Self {
        self.is_stale = true;
        self
    }

    pub fn is_dsts(&self) -> bool {
        self.key.provider_id.starts_with(DSTS_PROVIDER_PREFIX)
    }

    pub fn is_azure(&self) -> bool {
        self.key.provider_id.starts_with(AZURE_PROVIDER_PREFIX)
    }

    /// Matches by account id, or by email ignoring case
    pub fn matches_id(&self, id: &str) -> bool {
        self.key.account_id == id
            || self
                .email
                .as_deref()
                .map(|email| email.eq_ignore_ascii_case(id))
                .unwrap_or(false)
    }
}

/// Bearer token issued for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityToken {
    pub token: String,
    /// Expiry as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl SecurityToken {
    pub fn new(token: impl Into<String>, expires_on: Option<i64>) -> Self {
        Self {
            token: token.into(),
            expires_on,
            token_type: Some("Bearer".to_string()),
        }
    }
}
