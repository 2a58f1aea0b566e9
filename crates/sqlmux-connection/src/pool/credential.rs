//! Credential Resolver - passwords and bearer tokens before dial-out
//!
//! Failures to find an account, refresh it, or obtain a token are reported as
//! `false`, never as errors; the manager treats them like a missing password.

use std::sync::Arc;

use serde_json::json;
use sqlmux_core::{
    Account, AccountManagementService, AuthenticationType, AzureResource, ConnectionProfile,
    ConnectionResult, ConnectionResultExt, ConnectionStore,
};
use tracing::{debug, info, warn};

use super::dispatcher::ProviderDispatcher;

const POWER_BI_DOMAINS: [&str; 5] = [
    "pbidedicated.windows.net",
    "pbidedicated.cloudapi.de",
    "pbidedicated.usgovcloudapi.net",
    "pbidedicated.chinacloudapi.cn",
    "pbidedicated.windows-int.net",
];

/// Whether the server name belongs to a Power BI dedicated capacity
pub fn is_power_bi_server(server_name: &str) -> bool {
    let server = server_name.to_ascii_lowercase();
    POWER_BI_DOMAINS
        .iter()
        .any(|domain| server.ends_with(domain))
}

/// Profile after password lookup
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordResolution {
    pub profile: ConnectionProfile,
    /// The store had a saved credential for this profile
    pub found: bool,
}

pub struct CredentialResolver {
    store: Arc<dyn ConnectionStore>,
    accounts: Option<Arc<dyn AccountManagementService>>,
    dispatcher: Arc<ProviderDispatcher>,
}

impl CredentialResolver {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        accounts: Option<Arc<dyn AccountManagementService>>,
        dispatcher: Arc<ProviderDispatcher>,
    ) -> Self {
        Self {
            store,
            accounts,
            dispatcher,
        }
    }

    /// Fill in a stored password. An explicit password on the profile wins.
    pub async fn resolve_password(
        &self,
        profile: &ConnectionProfile,
    ) -> ConnectionResult<PasswordResolution> {
        let saved = self.store.add_saved_password(profile).await.store_err()?;
        let mut resolved = saved.profile;
        if !profile.password.is_empty() {
            resolved.password = profile.password.clone();
        }
        debug!(
            server = %profile.server_name,
            found = saved.saved_cred,
            "[CredentialResolver] Saved password lookup"
        );
        Ok(PasswordResolution {
            profile: resolved,
            found: saved.saved_cred,
        })
    }

    pub fn is_password_required(&self, profile: &ConnectionProfile) -> bool {
        self.store.is_password_required(profile)
    }

    /// Resolve the bearer token for token-based auth kinds.
    ///
    /// Other auth kinds get any stale token cleared and succeed without
    /// touching the account service.
    pub async fn fill_or_clear_token(&self, profile: &mut ConnectionProfile) -> bool {
        let auth = profile.authentication_type.clone();
        match auth {
            Some(AuthenticationType::DstsAuth) => self.fill_dsts_token(profile).await,
            Some(kind) if kind.is_azure_interactive() => self.fill_azure_token(profile).await,
            _ => {
                profile.clear_access_token();
                true
            }
        }
    }

    async fn cached_accounts(&self, profile: &mut ConnectionProfile) -> Option<Vec<Account>> {
        let Some(service) = &self.accounts else {
            warn!(
                server = %profile.server_name,
                "[CredentialResolver] No account service configured for token auth"
            );
            profile.clear_access_token();
            return None;
        };
        match service.get_accounts().await {
            Ok(accounts) => Some(accounts),
            Err(e) => {
                warn!(error = %e, "[CredentialResolver] Failed to enumerate accounts");
                profile.clear_access_token();
                None
            }
        }
    }

    async fn fill_dsts_token(&self, profile: &mut ConnectionProfile) -> bool {
        let Some(accounts) = self.cached_accounts(profile).await else {
            return false;
        };
        let Some(mut account) = accounts.into_iter().find(Account::is_dsts) else {
            info!(
                server = %profile.server_name,
                "[CredentialResolver] No delegated-token account available"
            );
            profile.clear_access_token();
            return false;
        };
        account.key.provider_args = Some(json!({
            "serverName": profile.server_name,
            "databaseName": profile.database_name,
        }));

        self.apply_token(profile, &account, None, None).await
    }

    async fn fill_azure_token(&self, profile: &mut ConnectionProfile) -> bool {
        let Some(accounts) = self.cached_accounts(profile).await else {
            return false;
        };
        let account_id = profile
            .azure_account
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| profile.user_name.clone());

        let Some(mut account) = accounts
            .into_iter()
            .filter(Account::is_azure)
            .find(|account| account.matches_id(&account_id))
        else {
            info!(
                account = %account_id,
                "[CredentialResolver] No cached Azure account matches profile"
            );
            profile.clear_access_token();
            return false;
        };

        if account.is_stale {
            debug!(account = %account_id, "[CredentialResolver] Refreshing stale account");
            let refreshed = match &self.accounts {
                Some(service) => service.refresh_account(&account).await,
                None => return false,
            };
            match refreshed {
                Ok(fresh) if !fresh.is_stale => account = fresh,
                Ok(_) => {
                    info!(account = %account_id, "[CredentialResolver] Account still stale after refresh");
                    profile.clear_access_token();
                    return false;
                }
                Err(e) => {
                    info!(
                        account = %account_id,
                        error = %e,
                        "[CredentialResolver] Account refresh failed or was cancelled"
                    );
                    profile.clear_access_token();
                    return false;
                }
            }
        }

        let tenant = profile.azure_tenant_id.clone();
        let resource = self.azure_resource_for(profile);
        self.apply_token(profile, &account, tenant.as_deref(), Some(resource))
            .await
    }

    async fn apply_token(
        &self,
        profile: &mut ConnectionProfile,
        account: &Account,
        tenant: Option<&str>,
        resource: Option<AzureResource>,
    ) -> bool {
        let Some(service) = &self.accounts else {
            return false;
        };
        match service
            .get_account_security_token(account, tenant, resource)
            .await
        {
            Ok(Some(token)) => {
                profile.set_access_token(token.token, token.expires_on);
                debug!(
                    server = %profile.server_name,
                    expires_on = ?token.expires_on,
                    "[CredentialResolver] Token resolved"
                );
                true
            }
            Ok(None) => {
                info!(server = %profile.server_name, "[CredentialResolver] Account service returned no token");
                profile.clear_access_token();
                false
            }
            Err(e) => {
                warn!(
                    server = %profile.server_name,
                    error = %e,
                    "[CredentialResolver] Token request failed"
                );
                profile.clear_access_token();
                false
            }
        }
    }

    /// Token audience for the profile's provider
    pub fn azure_resource_for(&self, profile: &ConnectionProfile) -> AzureResource {
        if is_power_bi_server(&profile.server_name) {
            return AzureResource::PowerBi;
        }
        match self
            .dispatcher
            .properties(&profile.provider_name)
            .and_then(|props| props.azure_resource)
        {
            Some(resource) => resource,
            None => {
                warn!(
                    provider_id = %profile.provider_name,
                    "[CredentialResolver] Provider declares no Azure resource, using Sql"
                );
                AzureResource::Sql
            }
        }
    }
}
