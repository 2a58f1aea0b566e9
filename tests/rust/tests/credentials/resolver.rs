//! CredentialResolver tests
//!
//! Password lookup, Azure and delegated-token resolution, token audience.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlmux_connection::{is_power_bi_server, CredentialResolver, ProviderDispatcher};
use sqlmux_core::{
    option_keys, Account, AuthenticationType, AzureResource, ConnectionProfile,
    ProviderProperties,
};
use tests::fixtures::{azure_account, azure_profile, now_plus, passwordless_profile, sql_login_profile};
use tests::mocks::{MockAccountService, MockConnectionStore};
use tests::PROVIDER;

fn dispatcher_with(resource: Option<AzureResource>) -> Arc<ProviderDispatcher> {
    let dispatcher = Arc::new(ProviderDispatcher::new(None));
    let mut properties = ProviderProperties::new(PROVIDER);
    if let Some(resource) = resource {
        properties = properties.with_azure_resource(resource);
    }
    dispatcher.declare_provider(properties);
    dispatcher
}

fn resolver(accounts: &Arc<MockAccountService>) -> CredentialResolver {
    CredentialResolver::new(
        Arc::new(MockConnectionStore::new()),
        Some(accounts.clone()),
        dispatcher_with(Some(AzureResource::Sql)),
    )
}

fn accounts_with(account: Account) -> Arc<MockAccountService> {
    Arc::new(
        MockAccountService::new()
            .with_account(account)
            .with_token("T", now_plus(3600)),
    )
}

// ============================================================================
// Passwords
// ============================================================================

#[tokio::test]
async fn test_saved_password_fills_empty_password() {
    let store = MockConnectionStore::new().with_saved_password(&passwordless_profile(), "secret");
    let resolver = CredentialResolver::new(Arc::new(store), None, dispatcher_with(None));

    let resolution = resolver.resolve_password(&passwordless_profile()).await.unwrap();

    assert!(resolution.found);
    assert_eq!(resolution.profile.password, "secret");
}

#[tokio::test]
async fn test_explicit_password_wins_over_saved() {
    let store = MockConnectionStore::new().with_saved_password(&sql_login_profile(), "saved");
    let resolver = CredentialResolver::new(Arc::new(store), None, dispatcher_with(None));

    let resolution = resolver.resolve_password(&sql_login_profile()).await.unwrap();

    assert!(resolution.found);
    assert_eq!(resolution.profile.password, "pw");
}

#[tokio::test]
async fn test_password_requirement_comes_from_store() {
    let resolver = CredentialResolver::new(
        Arc::new(MockConnectionStore::new()),
        None,
        dispatcher_with(None),
    );

    assert!(resolver.is_password_required(&sql_login_profile()));
    assert!(!resolver.is_password_required(&azure_profile("alice")));
}

// ============================================================================
// Azure tokens
// ============================================================================

#[tokio::test]
async fn test_non_token_auth_clears_stale_token_without_account_calls() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = ConnectionProfile::new(PROVIDER, "srv")
        .with_auth(AuthenticationType::Integrated)
        .with_option(option_keys::AZURE_ACCOUNT_TOKEN, "old")
        .with_option(option_keys::EXPIRES_ON, 1);

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);

    assert_eq!(profile.access_token(), None);
    assert_eq!(profile.token_expires_on(), None);
    assert_eq!(accounts.calls(), 0);
}

#[tokio::test]
async fn test_azure_token_resolved_and_password_cleared() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = azure_profile("alice").with_password("ignored");

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);

    assert_eq!(profile.access_token(), Some("T"));
    assert!(profile.token_expires_on().is_some());
    assert_eq!(profile.password, "");
    assert_eq!(
        profile.options.get(option_keys::PASSWORD),
        Some(&Value::String(String::new()))
    );
}

#[tokio::test]
async fn test_no_matching_account_fails() {
    let accounts = accounts_with(azure_account("bob"));
    let mut profile = azure_profile("alice");

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);

    assert_eq!(profile.access_token(), None);
    assert!(accounts.token_requests().is_empty());
}

#[tokio::test]
async fn test_account_matched_by_email_ignoring_case() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = azure_profile("ALICE@CONTOSO.COM");

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);
    assert_eq!(accounts.token_requests()[0].account.key.account_id, "alice");
}

#[tokio::test]
async fn test_account_falls_back_to_user_name() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = azure_profile("alice");
    profile.azure_account = None;

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);
}

#[tokio::test]
async fn test_non_azure_accounts_are_ignored() {
    let accounts = accounts_with(Account::new("github", "alice"));
    let mut profile = azure_profile("alice");

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);
}

#[tokio::test]
async fn test_stale_account_refreshed_before_token_request() {
    let accounts = Arc::new(
        MockAccountService::new()
            .with_account(azure_account("alice").stale())
            .with_refreshed_account(azure_account("alice"))
            .with_token("T", now_plus(3600)),
    );
    let mut profile = azure_profile("alice");

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);

    assert_eq!(accounts.refresh_calls(), 1);
    assert!(!accounts.token_requests()[0].account.is_stale);
}

#[tokio::test]
async fn test_cancelled_refresh_fails_quietly() {
    let accounts = Arc::new(
        MockAccountService::new()
            .with_account(azure_account("alice").stale())
            .with_token("T", now_plus(3600)),
    );
    let mut profile = azure_profile("alice");

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);

    assert_eq!(accounts.refresh_calls(), 1);
    assert!(accounts.token_requests().is_empty());
    assert_eq!(profile.access_token(), None);
}

#[tokio::test]
async fn test_account_still_stale_after_refresh_fails() {
    let accounts = Arc::new(
        MockAccountService::new()
            .with_account(azure_account("alice").stale())
            .with_refreshed_account(azure_account("alice").stale())
            .with_token("T", now_plus(3600)),
    );
    let mut profile = azure_profile("alice");

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);
    assert!(accounts.token_requests().is_empty());
}

#[tokio::test]
async fn test_missing_token_fails() {
    let accounts = Arc::new(MockAccountService::new().with_account(azure_account("alice")));
    let mut profile = azure_profile("alice");

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);
    assert_eq!(accounts.token_requests().len(), 1);
}

#[tokio::test]
async fn test_tenant_is_forwarded() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = azure_profile("alice").with_tenant("tenant-1");

    resolver(&accounts).fill_or_clear_token(&mut profile).await;

    assert_eq!(
        accounts.token_requests()[0].tenant_id.as_deref(),
        Some("tenant-1")
    );
}

#[tokio::test]
async fn test_no_account_service_fails() {
    let resolver = CredentialResolver::new(
        Arc::new(MockConnectionStore::new()),
        None,
        dispatcher_with(None),
    );
    let mut profile = azure_profile("alice");

    assert!(!resolver.fill_or_clear_token(&mut profile).await);
}

// ============================================================================
// Token audience
// ============================================================================

#[tokio::test]
async fn test_power_bi_server_uses_power_bi_resource() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = azure_profile("alice");
    profile.server_name = "capacity.PBIDedicated.Windows.net".to_string();

    resolver(&accounts).fill_or_clear_token(&mut profile).await;

    assert_eq!(
        accounts.token_requests()[0].resource,
        Some(AzureResource::PowerBi)
    );
}

#[tokio::test]
async fn test_declared_provider_resource_is_used() {
    let accounts = accounts_with(azure_account("alice"));
    let resolver = CredentialResolver::new(
        Arc::new(MockConnectionStore::new()),
        Some(accounts.clone()),
        dispatcher_with(Some(AzureResource::OssRdbms)),
    );
    let mut profile = azure_profile("alice");

    resolver.fill_or_clear_token(&mut profile).await;

    assert_eq!(
        accounts.token_requests()[0].resource,
        Some(AzureResource::OssRdbms)
    );
}

#[tokio::test]
async fn test_undeclared_resource_defaults_to_sql() {
    let accounts = accounts_with(azure_account("alice"));
    let resolver = CredentialResolver::new(
        Arc::new(MockConnectionStore::new()),
        Some(accounts.clone()),
        dispatcher_with(None),
    );

    assert_eq!(
        resolver.azure_resource_for(&azure_profile("alice")),
        AzureResource::Sql
    );
}

#[test]
fn test_power_bi_domains() {
    assert!(is_power_bi_server("x.pbidedicated.windows.net"));
    assert!(is_power_bi_server("x.pbidedicated.usgovcloudapi.net"));
    assert!(!is_power_bi_server("x.database.windows.net"));
}

// ============================================================================
// Delegated tokens
// ============================================================================

#[tokio::test]
async fn test_dsts_token_requested_with_server_args() {
    let accounts = accounts_with(Account::new("dstsAuth_prod", "svc"));
    let mut profile = ConnectionProfile::new(PROVIDER, "srv")
        .with_database("db")
        .with_auth(AuthenticationType::DstsAuth);

    assert!(resolver(&accounts).fill_or_clear_token(&mut profile).await);

    let request = &accounts.token_requests()[0];
    assert_eq!(
        request.account.key.provider_args,
        Some(json!({ "serverName": "srv", "databaseName": "db" }))
    );
    assert_eq!(request.tenant_id, None);
    assert_eq!(request.resource, None);
    assert_eq!(profile.access_token(), Some("T"));
}

#[tokio::test]
async fn test_dsts_without_account_fails() {
    let accounts = accounts_with(azure_account("alice"));
    let mut profile = ConnectionProfile::new(PROVIDER, "srv").with_auth(AuthenticationType::DstsAuth);

    assert!(!resolver(&accounts).fill_or_clear_token(&mut profile).await);
    assert!(accounts.token_requests().is_empty());
}
