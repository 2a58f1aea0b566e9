use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ConnectionProfile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleResponse {
    pub can_handle_firewall_rule: bool,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub resource_provider_id: Option<String>,
}

/// Remediation for cloud servers that reject unknown client addresses
#[async_trait]
pub trait FirewallRuleService: Send + Sync {
    async fn handle_firewall_rule(
        &self,
        error_code: i32,
        error_message: &str,
        provider_id: &str,
    ) -> anyhow::Result<FirewallRuleResponse>;

    /// Returns true when the user added a rule and a retry is worthwhile
    async fn show_firewall_rule_dialog(
        &self,
        profile: &ConnectionProfile,
        ip_address: Option<&str>,
        resource_provider_id: Option<&str>,
    ) -> anyhow::Result<bool>;
}
