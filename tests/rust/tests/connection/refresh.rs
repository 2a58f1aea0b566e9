//! Token refresh tests
//!
//! A token near expiry is refreshed by reconnecting the URI. Concurrent
//! callers share one reconnect and all observe its result.

use futures::future::join_all;
use pretty_assertions::assert_eq;
use sqlmux_core::{ConnectOptions, ConnectionError};
use tests::fixtures::{azure_account, azure_profile, now_plus, sql_login_profile};
use tests::mocks::{MockAccountService, MockConnectionStore};
use tests::{wait_until, ConnectionManagerTestHarness, ProviderMode};

const EDITOR: &str = "editor-1";

/// Harness with an Azure connection on EDITOR whose token expires in `expires_in` seconds
async fn connected_azure_harness(expires_in: i64) -> ConnectionManagerTestHarness {
    let accounts = MockAccountService::new()
        .with_account(azure_account("alice"))
        .with_token("T1", now_plus(expires_in));
    let harness = ConnectionManagerTestHarness::with_collaborators(MockConnectionStore::new(), accounts);

    let outcome = harness
        .manager
        .connect(azure_profile("alice"), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();
    assert!(outcome.is_connected());
    harness
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_reconnect() {
    let harness = connected_azure_harness(30).await;
    harness.provider.set_mode(ProviderMode::Manual);
    harness.accounts.set_token("T2", now_plus(3600));

    let refreshes = join_all(
        (0..5).map(|_| harness.manager.refresh_azure_account_token_if_necessary(EDITOR)),
    );
    let driver = async {
        assert!(wait_until(|| harness.provider.dispatch_count() == 2).await);
        harness.provider.complete_success(EDITOR);
    };

    let (results, _) = tokio::join!(refreshes, driver);

    assert!(results.iter().all(|r| r == &Ok(true)));
    assert_eq!(harness.provider.dispatch_count(), 2);
    let profile = harness.manager.get_connection_profile(EDITOR).unwrap();
    assert_eq!(profile.access_token(), Some("T2"));
}

#[tokio::test]
async fn test_failed_reconnect_is_shared_by_all_waiters() {
    let harness = connected_azure_harness(30).await;
    harness.provider.set_mode(ProviderMode::Manual);

    let refreshes = join_all(
        (0..3).map(|_| harness.manager.refresh_azure_account_token_if_necessary(EDITOR)),
    );
    let driver = async {
        assert!(wait_until(|| harness.provider.dispatch_count() == 2).await);
        harness
            .provider
            .complete_failure(EDITOR, "token rejected", Some(18456));
    };

    let (results, _) = tokio::join!(refreshes, driver);

    let expected = Err(ConnectionError::TokenRefreshFailed {
        uri: EDITOR.to_string(),
        reason: "token rejected".to_string(),
    });
    assert!(results.iter().all(|r| r == &expected));
    assert_eq!(harness.provider.dispatch_count(), 2);
    assert!(!harness.manager.is_connected(EDITOR));
}

#[tokio::test]
async fn test_token_far_from_expiry_is_not_refreshed() {
    let harness = connected_azure_harness(3600).await;

    let refreshed = harness
        .manager
        .refresh_azure_account_token_if_necessary(EDITOR)
        .await;

    assert_eq!(refreshed, Ok(true));
    assert_eq!(harness.provider.dispatch_count(), 1);
}

#[tokio::test]
async fn test_non_azure_connection_reports_false() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    let refreshed = harness
        .manager
        .refresh_azure_account_token_if_necessary(EDITOR)
        .await;

    assert_eq!(refreshed, Ok(false));
    assert_eq!(harness.accounts.calls(), 0);
}

#[tokio::test]
async fn test_unknown_uri_needs_no_refresh() {
    let harness = ConnectionManagerTestHarness::new();

    let refreshed = harness
        .manager
        .refresh_azure_account_token_if_necessary("nowhere")
        .await;

    assert_eq!(refreshed, Ok(true));
}

#[tokio::test]
async fn test_list_databases_refreshes_expiring_token_first() {
    let harness = connected_azure_harness(30).await;
    harness.provider.set_databases(&["sales", "archive"]);

    let databases = harness.manager.list_databases(EDITOR).await.unwrap();

    assert_eq!(harness.provider.dispatch_count(), 2);
    assert_eq!(
        databases.unwrap().database_names,
        vec!["archive".to_string(), "sales".to_string()]
    );
}
