//! Failure remediation tests
//!
//! Firewall-rule and diagnostics retries are bounded to one extra dial;
//! the connection dialog recovers from missing credentials and rejections.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use serde_json::Value;
use sqlmux_core::{
    ConnectOptions, ConnectOutcome, ConnectionType, DialogParams, DialogResponse, FailureKind,
    CONNECTION_NOT_ACCEPTED,
};
use tests::fixtures::{passwordless_profile, sql_login_profile};
use tests::{ConnectionManagerTestHarness, ProviderMode};

const EDITOR: &str = "editor-1";
const FIREWALL_CODE: i32 = 40615;

// ============================================================================
// Firewall rule
// ============================================================================

#[tokio::test]
async fn test_firewall_retry_is_bounded_to_one() {
    let mut harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .set_mode(ProviderMode::fail(FIREWALL_CODE, "Client IP is not allowed"));
    harness.firewall.set_handles_errors(true, true);

    let outcome = harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(harness.provider.dispatch_count(), 2);
    assert_eq!(harness.firewall.dialog_calls(), 1);

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.message, CONNECTION_NOT_ACCEPTED);
    assert_eq!(failure.provider_message.as_deref(), Some("Client IP is not allowed"));
    assert_eq!(failure.kind, FailureKind::FirewallBlocked);
    assert!(!failure.handled);
    assert!(harness.manager.find_connection(EDITOR).is_none());

    let types = harness.event_types();
    assert_eq!(types.iter().filter(|t| **t == "connect_started").count(), 1);
    assert_eq!(types.last(), Some(&"connect_rejected"));
}

#[tokio::test]
async fn test_firewall_then_success_reports_remediation() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .queue_mode(ProviderMode::fail(FIREWALL_CODE, "Client IP is not allowed"));
    harness.firewall.set_handles_errors(true, true);

    let outcome = harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    assert!(matches!(outcome, ConnectOutcome::ConnectedAfterRemediation { .. }));
    assert!(outcome.is_connected());
    assert!(harness.manager.is_connected(EDITOR));
    assert_eq!(harness.provider.dispatch_count(), 2);
}

#[tokio::test]
async fn test_declined_firewall_rule_is_handled_rejection() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .set_mode(ProviderMode::fail(FIREWALL_CODE, "Client IP is not allowed"));
    harness.firewall.set_handles_errors(true, false);

    let outcome = harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.message, CONNECTION_NOT_ACCEPTED);
    assert!(failure.handled);
    assert_eq!(harness.provider.dispatch_count(), 1);
    assert_eq!(harness.diagnostics.calls(), 0);
}

#[tokio::test]
async fn test_firewall_skipped_when_disabled() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .set_mode(ProviderMode::fail(FIREWALL_CODE, "Client IP is not allowed"));
    harness.firewall.set_handles_errors(true, true);

    let outcome = harness
        .manager
        .connect(
            sql_login_profile(),
            Some(EDITOR.to_string()),
            ConnectOptions::default().with_firewall_on_error(false),
        )
        .await
        .unwrap();

    assert_eq!(outcome.error_code(), Some(FIREWALL_CODE));
    assert_eq!(harness.firewall.handle_calls(), 0);
    assert_eq!(harness.diagnostics.calls(), 0);
}

#[tokio::test]
async fn test_failure_without_code_skips_remediation() {
    let harness = ConnectionManagerTestHarness::new();
    harness.provider.set_mode(ProviderMode::Fail {
        code: None,
        message: String::new(),
    });

    let outcome = harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::ConnectionNotAccepted);
    assert_eq!(failure.message, CONNECTION_NOT_ACCEPTED);
    assert_eq!(harness.firewall.handle_calls(), 0);
}

// ============================================================================
// Error diagnostics
// ============================================================================

#[tokio::test]
async fn test_diagnostics_reconnect_with_replaced_options() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .queue_mode(ProviderMode::fail(-2146893019, "certificate chain not trusted"));
    let mut replaced = BTreeMap::new();
    replaced.insert("trustServerCertificate".to_string(), Value::Bool(true));
    harness.diagnostics.handle_with(true, Some(replaced));

    let outcome = harness
        .manager
        .connect(sql_login_profile(), None, ConnectOptions::default())
        .await
        .unwrap();

    assert!(matches!(outcome, ConnectOutcome::Connected { .. }));
    assert!(outcome.uri().unwrap().starts_with("connection:"));
    assert_eq!(harness.provider.dispatch_count(), 2);
    assert_eq!(harness.diagnostics.calls(), 1);

    let info = harness.provider.last_connection_info().unwrap();
    assert_eq!(info.options.get("trustServerCertificate"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_diagnostics_reconnect_failure_is_not_retried_again() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .set_mode(ProviderMode::fail(-2146893019, "certificate chain not trusted"));
    harness.diagnostics.handle_with(true, None);

    let outcome = harness
        .manager
        .connect(sql_login_profile(), None, ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.error_message(), Some("certificate chain not trusted"));
    assert_eq!(harness.provider.dispatch_count(), 2);
    assert_eq!(harness.diagnostics.calls(), 1);
}

#[tokio::test]
async fn test_diagnostics_handled_without_reconnect_cancels() {
    let mut harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .set_mode(ProviderMode::fail(18456, "Login failed"));
    harness.diagnostics.handle_with(false, None);

    let outcome = harness
        .manager
        .connect(sql_login_profile(), Some(EDITOR.to_string()), ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ConnectOutcome::Canceled);
    assert_eq!(harness.provider.dispatch_count(), 1);
    assert_eq!(harness.event_types().last(), Some(&"connect_canceled"));
}

// ============================================================================
// Connection dialog
// ============================================================================

#[tokio::test]
async fn test_dialog_cancel_returns_handled_rejection() {
    let harness = ConnectionManagerTestHarness::new();

    let outcome = harness
        .manager
        .connect(
            passwordless_profile(),
            Some(EDITOR.to_string()),
            ConnectOptions::interactive(),
        )
        .await
        .unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::CredentialUnavailable);
    assert!(failure.handled);
    assert!(outcome.is_handled());
    assert_eq!(harness.provider.dispatch_count(), 0);

    let requests = harness.dialog.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].params.connection_type, ConnectionType::Editor);
    assert_eq!(requests[0].params.uri.as_deref(), Some(EDITOR));
    assert_eq!(
        requests[0].last_error.as_ref().map(|f| f.kind),
        Some(FailureKind::CredentialUnavailable)
    );
}

#[tokio::test]
async fn test_dialog_for_synthesized_uri_uses_default_type() {
    let harness = ConnectionManagerTestHarness::new();

    harness
        .manager
        .connect(passwordless_profile(), None, ConnectOptions::interactive())
        .await
        .unwrap();

    let requests = harness.dialog.requests();
    assert_eq!(requests[0].params.connection_type, ConnectionType::Default);
}

#[tokio::test]
async fn test_dialog_submit_connects_and_saves() {
    let mut harness = ConnectionManagerTestHarness::new();
    harness
        .dialog
        .respond_with(DialogResponse::Submitted(sql_login_profile()));

    let outcome = harness
        .manager
        .connect(passwordless_profile(), None, ConnectOptions::interactive())
        .await
        .unwrap();

    assert!(outcome.is_connected());
    assert_eq!(harness.store.saved_profiles().len(), 1);
    assert_eq!(
        harness.event_types(),
        vec![
            "connect_started",
            "connect_request_sent",
            "connect_succeeded",
            "connection_profile_added",
            "connection_profile_created",
            "connected"
        ]
    );
}

#[tokio::test]
async fn test_dialog_submit_for_temporary_connection_does_not_save() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .dialog
        .respond_with(DialogResponse::Submitted(sql_login_profile()));
    let params = DialogParams {
        connection_type: ConnectionType::Temporary,
        ..Default::default()
    };

    let outcome = harness
        .manager
        .connect(
            passwordless_profile(),
            Some(EDITOR.to_string()),
            ConnectOptions::interactive().with_params(params),
        )
        .await
        .unwrap();

    assert!(outcome.is_connected());
    assert!(harness.store.saved_profiles().is_empty());
}

#[tokio::test]
async fn test_dialog_shown_after_provider_rejection() {
    let harness = ConnectionManagerTestHarness::new();
    harness
        .provider
        .queue_mode(ProviderMode::fail(18456, "Login failed for user 'sa'"));
    harness
        .dialog
        .respond_with(DialogResponse::Submitted(sql_login_profile().with_password("right")));

    let outcome = harness
        .manager
        .connect(
            sql_login_profile().with_password("wrong"),
            Some(EDITOR.to_string()),
            ConnectOptions::interactive(),
        )
        .await
        .unwrap();

    assert!(outcome.is_connected());
    assert_eq!(harness.provider.dispatch_count(), 2);
    let requests = harness.dialog.requests();
    assert_eq!(
        requests[0].last_error.as_ref().map(|f| f.message.as_str()),
        Some("Login failed for user 'sa'")
    );
}
