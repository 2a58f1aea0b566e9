use async_trait::async_trait;

use crate::domain::{Account, AzureResource, SecurityToken};

/// Cached identity accounts and token issuance
#[async_trait]
pub trait AccountManagementService: Send + Sync {
    async fn get_accounts(&self) -> anyhow::Result<Vec<Account>>;

    /// Re-authenticate a stale account. Fails when the user cancels the prompt.
    async fn refresh_account(&self, account: &Account) -> anyhow::Result<Account>;

    /// Token for `account`, scoped to `tenant_id` and `resource` when given
    async fn get_account_security_token(
        &self,
        account: &Account,
        tenant_id: Option<&str>,
        resource: Option<AzureResource>,
    ) -> anyhow::Result<Option<SecurityToken>>;
}
