//! ConnectionManager - Central orchestrator for connection lifecycle
//!
//! Connect protocol:
//! - Resolve password (store, then an active connection with the same fingerprint)
//! - Resolve bearer token; missing credentials route to the connection dialog
//! - Register a status entry, dispatch to the provider, await the completion notification
//! - On failure: firewall-rule remediation, then error diagnostics, each allowed once
//!
//! Concurrency:
//! - `in_flight`: concurrent `connect` calls for one URI join the running attempt
//! - `pending_reconnects`: concurrent token refreshes for one URI share one reconnect
//! - Completion notifications arrive through [`CompletionSink`] and are dropped for
//!   entries that were cancelled or superseded

use std::sync::Arc;

use dashmap::DashSet;
use futures::FutureExt;
use serde_json::Value;
use sqlmux_core::{
    generate_uri, option_keys, AuthenticationType, ChangedConnectionInfo, ConnectFailure,
    ConnectOptions, ConnectOutcome, ConnectionDialogService, ConnectionError, ConnectionInfo,
    ConnectionInfoSummary, ConnectionProfile, ConnectionProvider, ConnectionPurpose,
    ConnectionResult, ConnectionResultExt, ConnectionStore, ConnectionType, DialogParams,
    DialogRequest, DialogResponse, DomainEvent, ErrorDiagnosticsService, EventSender,
    FailureKind, FirewallRuleResponse, FirewallRuleService, ListDatabasesResult, ManagerSettings,
    PasswordChangeResult, ProviderProperties, CONNECTION_NOT_ACCEPTED,
};
use tracing::{debug, error, info, warn};

use super::attempt::ConnectAttempt;
use super::credential::CredentialResolver;
use super::dispatcher::ProviderDispatcher;
use super::pending::PendingMap;
use super::status::{
    ActiveConnection, Completion, CompletionDelivery, ConnectionState, ConnectionStatusTable,
    ProfileIdentity,
};
use crate::dependencies::ManagerDependencies;

/// Language id recorded by `ensure_default_language_flavor`
const DEFAULT_LANGUAGE: &str = "sql";

/// What `disconnect` acts on
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    Uri(String),
    Profile(ConnectionProfile),
}

/// Handle providers use to push out-of-band notifications
///
/// Cheap to clone; holds no reference to the manager itself.
#[derive(Clone)]
pub struct CompletionSink {
    status: Arc<ConnectionStatusTable>,
    events: EventSender,
    warned_versions: Arc<DashSet<String>>,
    warn_unsupported_version: bool,
}

impl CompletionSink {
    /// Deliver a connection-complete notification
    pub fn on_connection_complete(&self, summary: ConnectionInfoSummary) {
        let uri = summary.owner_uri.clone();
        let unsupported = summary.is_supported_version == Some(false);
        let version_message = summary.unsupported_version_message.clone();

        match self.status.complete(summary) {
            CompletionDelivery::Dropped => {}
            CompletionDelivery::Succeeded { profile, durations } => {
                info!(
                    uri = %uri,
                    extension_ms = durations.extension.as_millis() as u64,
                    service_ms = durations.service.as_millis() as u64,
                    "[ConnectionManager] Connection complete"
                );
                if unsupported
                    && self.warn_unsupported_version
                    && self.warned_versions.insert(profile.fingerprint())
                {
                    warn!(uri = %uri, "[ConnectionManager] Unsupported server version");
                    self.events.emit(DomainEvent::UnsupportedServerVersion {
                        uri,
                        message: version_message,
                    });
                }
            }
            CompletionDelivery::Failed { durations } => {
                info!(
                    uri = %uri,
                    extension_ms = durations.extension.as_millis() as u64,
                    service_ms = durations.service.as_millis() as u64,
                    "[ConnectionManager] Connection failed"
                );
            }
        }
    }

    /// The provider observed a change of server, database or user
    pub fn on_connection_changed(&self, changed: ChangedConnectionInfo) {
        match self.status.on_connection_changed(&changed) {
            Some(profile) => {
                debug!(uri = %changed.connection_uri, "[ConnectionManager] Connection changed");
                self.events.emit(DomainEvent::ConnectionChanged {
                    uri: changed.connection_uri,
                    profile,
                });
            }
            None => {
                debug!(uri = %changed.connection_uri, "[ConnectionManager] Change for unknown uri ignored");
            }
        }
    }
}

/// Result of one dial through the provider
enum DialOutcome {
    Connected(ConnectionProfile),
    Failed(ConnectFailure),
    Abandoned,
}

/// Result of one pass through `run_attempt`
enum AttemptResult {
    Finished(ConnectOutcome),
    Failed(ConnectFailure),
}

pub struct ConnectionManager {
    settings: ManagerSettings,
    store: Arc<dyn ConnectionStore>,
    dispatcher: Arc<ProviderDispatcher>,
    status: Arc<ConnectionStatusTable>,
    credentials: CredentialResolver,
    firewall: Option<Arc<dyn FirewallRuleService>>,
    dialog: Option<Arc<dyn ConnectionDialogService>>,
    diagnostics: Option<Arc<dyn ErrorDiagnosticsService>>,
    events: EventSender,
    sink: CompletionSink,
    in_flight: PendingMap<ConnectionResult<ConnectOutcome>>,
    pending_reconnects: PendingMap<ConnectionResult<bool>>,
}

impl ConnectionManager {
    pub fn new(deps: ManagerDependencies) -> Arc<Self> {
        let dispatcher = Arc::new(ProviderDispatcher::new(
            deps.settings.provider_ready_timeout(),
        ));
        let status = Arc::new(ConnectionStatusTable::new());
        let credentials = CredentialResolver::new(
            deps.store.clone(),
            deps.account_service.clone(),
            dispatcher.clone(),
        );
        let sink = CompletionSink {
            status: status.clone(),
            events: deps.events.clone(),
            warned_versions: Arc::new(DashSet::new()),
            warn_unsupported_version: deps.settings.show_unsupported_server_version_warning,
        };

        Arc::new(Self {
            settings: deps.settings,
            store: deps.store,
            dispatcher,
            status,
            credentials,
            firewall: deps.firewall,
            dialog: deps.dialog,
            diagnostics: deps.diagnostics,
            events: deps.events,
            sink,
            in_flight: PendingMap::new("connect"),
            pending_reconnects: PendingMap::new("reconnect"),
        })
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    // ════════════════════════════════════════════════════════════════════════
    // PROVIDERS
    // ════════════════════════════════════════════════════════════════════════

    pub fn declare_provider(&self, properties: ProviderProperties) {
        self.dispatcher.declare_provider(properties);
    }

    pub fn register_provider(
        &self,
        provider_id: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> ConnectionResult<()> {
        self.dispatcher.register_provider(provider_id, provider)
    }

    /// Handle to give providers for completion and change notifications
    pub fn completion_sink(&self) -> CompletionSink {
        self.sink.clone()
    }

    pub fn on_connection_complete(&self, summary: ConnectionInfoSummary) {
        self.sink.on_connection_complete(summary);
    }

    pub fn on_connection_changed(&self, changed: ChangedConnectionInfo) {
        self.sink.on_connection_changed(changed);
    }

    /// Configured engine, if that provider is known
    pub fn default_provider_id(&self) -> Option<String> {
        let engine = &self.settings.default_engine;
        self.dispatcher
            .has_provider(engine)
            .then(|| engine.clone())
    }

    /// Configured auth kind, for providers that expose an auth-type option
    pub fn default_authentication_type(&self, provider_id: &str) -> Option<AuthenticationType> {
        self.dispatcher
            .properties(provider_id)
            .filter(|props| props.supports_auth_type_option)
            .and_then(|_| self.settings.default_auth_type())
    }

    // ════════════════════════════════════════════════════════════════════════
    // CONNECT
    // ════════════════════════════════════════════════════════════════════════

    /// Connect `profile` on `uri`, generating the URI when absent.
    ///
    /// A call for a URI that already has a connect in flight joins it and
    /// observes the same outcome.
    pub async fn connect(
        self: &Arc<Self>,
        profile: ConnectionProfile,
        uri: Option<String>,
        options: ConnectOptions,
    ) -> ConnectionResult<ConnectOutcome> {
        let (uri, synthesized) = match uri.filter(|u| !u.is_empty()) {
            Some(uri) => (uri, false),
            None => (generate_uri(&profile, ConnectionPurpose::Connection), true),
        };

        let manager = Arc::clone(self);
        let key = uri.clone();
        let (operation, joined) = self.in_flight.join_or_start(&key, move || {
            async move { manager.try_connect(profile, uri, options, synthesized).await }.boxed()
        });
        if joined {
            info!(uri = %key, "[ConnectionManager] Joining in-flight connect");
        }
        operation.await
    }

    /// Connect and persist without a saved-password lookup.
    ///
    /// Used for profiles submitted from the dialog. Defaults to
    /// [`ConnectOptions::save_profile`].
    pub async fn connect_and_save_profile(
        self: &Arc<Self>,
        profile: ConnectionProfile,
        uri: Option<String>,
        options: Option<ConnectOptions>,
    ) -> ConnectionResult<ConnectOutcome> {
        let options = options.unwrap_or_else(ConnectOptions::save_profile);
        let uri = uri
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| generate_uri(&profile, ConnectionPurpose::Connection));

        let manager = Arc::clone(self);
        let key = uri.clone();
        let (operation, _) = self.in_flight.join_or_start(&key, move || {
            async move {
                let identity = ProfileIdentity::of(&profile);
                manager
                    .connect_with_options(profile, identity, uri, options)
                    .await
            }
            .boxed()
        });
        operation.await
    }

    /// URI of an existing connection for this profile and purpose, or connect.
    pub async fn connect_if_not_connected(
        self: &Arc<Self>,
        profile: ConnectionProfile,
        purpose: ConnectionPurpose,
        save_connection: bool,
    ) -> ConnectionResult<String> {
        if let Some(uri) = self.find_existing_connection(&profile, purpose) {
            debug!(uri = %uri, "[ConnectionManager] Reusing existing connection");
            return Ok(uri);
        }

        let uri = generate_uri(&profile, purpose);
        let server = profile.server_name.clone();
        let options = ConnectOptions::interactive().with_save(save_connection);

        match self.connect(profile, Some(uri.clone()), options).await? {
            outcome if outcome.is_connected() => {
                Ok(outcome.uri().map(str::to_string).unwrap_or(uri))
            }
            ConnectOutcome::Rejected(failure) if failure.kind == FailureKind::CredentialUnavailable => {
                Err(ConnectionError::CredentialUnavailable { server })
            }
            ConnectOutcome::Rejected(failure) => Err(ConnectionError::ProviderRejected {
                message: failure.message,
                code: failure.code,
            }),
            _ => Err(ConnectionError::ProviderRejected {
                message: CONNECTION_NOT_ACCEPTED.to_string(),
                code: None,
            }),
        }
    }

    async fn try_connect(
        &self,
        profile: ConnectionProfile,
        uri: String,
        options: ConnectOptions,
        synthesized_uri: bool,
    ) -> ConnectionResult<ConnectOutcome> {
        let original = profile.clone();
        let identity = ProfileIdentity::of(&original);

        let resolution = self.credentials.resolve_password(&profile).await?;
        let mut candidate = resolution.profile;
        let password_required = self.credentials.is_password_required(&candidate);

        if password_required && candidate.password.is_empty() {
            if let Some(active) = self.status.find_by_profile(&candidate) {
                if !active.profile.password.is_empty() {
                    debug!(uri = %uri, "[ConnectionManager] Reusing password of active connection");
                    candidate.password = active.profile.password;
                }
            }
        }

        let token_resolved = self.credentials.fill_or_clear_token(&mut candidate).await;

        if candidate.authentication_type.is_none() {
            candidate.authentication_type =
                self.default_authentication_type(&candidate.provider_name);
        }

        if !token_resolved || (password_required && candidate.password.is_empty()) {
            info!(
                uri = %uri,
                token_resolved,
                "[ConnectionManager] Credentials unavailable"
            );
            let failure = ConnectFailure::credential_unavailable();
            if !self.dialog_enabled(&options) {
                return Ok(self.reject(&uri, failure));
            }
            return self
                .show_dialog_on_error(original, identity, uri, failure, options, synthesized_uri)
                .await;
        }

        let outcome = self
            .connect_with_options(candidate, identity.clone(), uri.clone(), options.clone())
            .await?;

        match outcome {
            ConnectOutcome::Rejected(failure)
                if !failure.handled && self.dialog_enabled(&options) =>
            {
                self.show_dialog_on_error(original, identity, uri, failure, options, synthesized_uri)
                    .await
            }
            other => Ok(other),
        }
    }

    fn dialog_enabled(&self, options: &ConnectOptions) -> bool {
        options.show_connection_dialog_on_error && self.dialog.is_some()
    }

    async fn show_dialog_on_error(
        &self,
        profile: ConnectionProfile,
        identity: ProfileIdentity,
        uri: String,
        failure: ConnectFailure,
        options: ConnectOptions,
        synthesized_uri: bool,
    ) -> ConnectionResult<ConnectOutcome> {
        let Some(dialog) = self.dialog.clone() else {
            return Ok(ConnectOutcome::Rejected(failure));
        };

        let params = options.params.clone().unwrap_or_else(|| DialogParams {
            connection_type: if synthesized_uri {
                ConnectionType::Default
            } else {
                ConnectionType::Editor
            },
            uri: Some(uri.clone()),
            show_dashboard: options.show_dashboard,
            ..Default::default()
        });

        info!(uri = %uri, kind = ?failure.kind, "[ConnectionManager] Opening connection dialog");
        let response = dialog
            .show_dialog(DialogRequest {
                params: params.clone(),
                profile: Some(profile),
                last_error: Some(failure.clone()),
                options: options.clone(),
            })
            .await
            .dialog_err()?;

        match response {
            DialogResponse::Submitted(submitted) => {
                let retry_options = ConnectOptions {
                    save_the_connection: params.connection_type != ConnectionType::Temporary,
                    show_dashboard: params.show_dashboard,
                    show_connection_dialog_on_error: false,
                    show_firewall_rule_on_error: true,
                    params: Some(params),
                };
                let identity = identity.with(&submitted);
                self.connect_with_options(submitted, identity, uri, retry_options)
                    .await
            }
            DialogResponse::Cancelled => {
                info!(uri = %uri, "[ConnectionManager] Connection dialog cancelled");
                Ok(ConnectOutcome::Rejected(failure.handled()))
            }
        }
    }

    /// Dial with retries; remediation runs at most once per call
    async fn connect_with_options(
        &self,
        profile: ConnectionProfile,
        identity: ProfileIdentity,
        uri: String,
        options: ConnectOptions,
    ) -> ConnectionResult<ConnectOutcome> {
        let mut profile = profile;
        let mut uri = uri;
        let mut attempt = ConnectAttempt::first(options.show_firewall_rule_on_error);

        self.events.emit(DomainEvent::ConnectStarted { uri: uri.clone() });

        loop {
            debug!(
                uri = %uri,
                attempt = attempt.number(),
                "[ConnectionManager] Connect attempt"
            );

            let failure = match self
                .run_attempt(&mut profile, &identity, &uri, &options)
                .await?
            {
                AttemptResult::Finished(outcome) if attempt.after_firewall() => {
                    return Ok(outcome.after_remediation());
                }
                AttemptResult::Finished(outcome) => return Ok(outcome),
                AttemptResult::Failed(failure) => failure,
            };

            if attempt.after_firewall() {
                warn!(uri = %uri, "[ConnectionManager] Connect still failing after firewall rule was added");
                let failure = failure.into_not_accepted(FailureKind::FirewallBlocked);
                return Ok(self.reject(&uri, failure));
            }

            let code = match (failure.code, attempt.remediation_allowed()) {
                (Some(code), true) => code,
                _ => return Ok(self.reject(&uri, failure)),
            };

            if let Some(firewall) = &self.firewall {
                let response = match firewall
                    .handle_firewall_rule(code, &failure.message, &profile.provider_name)
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(uri = %uri, error = %e, "[ConnectionManager] Firewall service failed");
                        FirewallRuleResponse::default()
                    }
                };

                if response.can_handle_firewall_rule {
                    info!(uri = %uri, code, "[ConnectionManager] Offering firewall rule");
                    let added = firewall
                        .show_firewall_rule_dialog(
                            &profile,
                            response.ip_address.as_deref(),
                            response.resource_provider_id.as_deref(),
                        )
                        .await
                        .unwrap_or_else(|e| {
                            warn!(uri = %uri, error = %e, "[ConnectionManager] Firewall dialog failed");
                            false
                        });

                    if let Some(next) = attempt.retry_after_firewall().filter(|_| added) {
                        attempt = next;
                        continue;
                    }

                    info!(uri = %uri, "[ConnectionManager] Firewall rule declined");
                    let failure = failure
                        .into_not_accepted(FailureKind::FirewallBlocked)
                        .handled();
                    return Ok(self.reject(&uri, failure));
                }
            }

            if let Some(diagnostics) = &self.diagnostics {
                match diagnostics
                    .try_handle_connection_error(&failure, &profile.provider_name, &profile)
                    .await
                {
                    Ok(result) if result.handled => {
                        if let Some(replaced) = result.options {
                            profile.options = replaced;
                        }
                        if result.reconnect {
                            if let Some(next) = attempt.retry_after_diagnostics() {
                                let purpose = ConnectionPurpose::from_uri(&uri).unwrap_or_default();
                                uri = generate_uri(&profile, purpose);
                                info!(uri = %uri, "[ConnectionManager] Diagnostics requested reconnect");
                                attempt = next;
                                continue;
                            }
                        }
                        info!(uri = %uri, "[ConnectionManager] Error handled by diagnostics");
                        self.events
                            .emit(DomainEvent::ConnectCanceled { uri: uri.clone() });
                        return Ok(ConnectOutcome::Canceled);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(uri = %uri, error = %e, "[ConnectionManager] Error diagnostics failed");
                    }
                }
            }

            return Ok(self.reject(&uri, failure));
        }
    }

    fn reject(&self, uri: &str, failure: ConnectFailure) -> ConnectOutcome {
        warn!(
            uri = %uri,
            code = ?failure.code,
            kind = ?failure.kind,
            message = %failure.message,
            "[ConnectionManager] Connection rejected"
        );
        self.events.emit(DomainEvent::ConnectRejected {
            uri: uri.to_string(),
            message: failure.message.clone(),
            code: failure.code,
        });
        ConnectOutcome::Rejected(failure)
    }

    async fn run_attempt(
        &self,
        profile: &mut ConnectionProfile,
        identity: &ProfileIdentity,
        uri: &str,
        options: &ConnectOptions,
    ) -> ConnectionResult<AttemptResult> {
        if let Some(group_id) = profile.group_id.clone() {
            profile
                .options
                .insert(option_keys::GROUP_ID.to_string(), Value::String(group_id));
        }
        profile.options.insert(
            option_keys::DATABASE_DISPLAY_NAME.to_string(),
            Value::String(profile.database_name.clone()),
        );

        let matcher = options.edit_matcher();
        if let Some(matcher) = &matcher {
            if self
                .store
                .is_duplicate_edit(profile, matcher)
                .await
                .store_err()?
            {
                let group = profile
                    .group_full_name
                    .clone()
                    .unwrap_or_else(|| "<default>".to_string());
                warn!(uri = %uri, group = %group, "[ConnectionManager] Edit duplicates a saved profile");
                return Err(ConnectionError::DuplicateEdit {
                    key: profile.fingerprint(),
                    group,
                });
            }
        }

        if !self.credentials.fill_or_clear_token(profile).await {
            return Ok(AttemptResult::Failed(
                ConnectFailure::credential_unavailable(),
            ));
        }

        if options.save_the_connection {
            profile.options.insert(
                option_keys::ORIGINAL_DATABASE.to_string(),
                Value::String(profile.database_name.clone()),
            );
        }

        let mut connected = match self
            .create_new_connection(profile.clone(), identity.clone(), uri)
            .await?
        {
            DialOutcome::Connected(connected) => connected,
            DialOutcome::Failed(failure) => return Ok(AttemptResult::Failed(failure)),
            DialOutcome::Abandoned => {
                info!(uri = %uri, "[ConnectionManager] Connect abandoned before completion");
                return Ok(AttemptResult::Finished(ConnectOutcome::Canceled));
            }
        };

        if options.save_the_connection {
            if let Err(e) = self.store.add_recent_connection(&connected).await {
                warn!(uri = %uri, error = %e, "[ConnectionManager] Failed to add recent connection");
            }
        }

        self.events.emit(DomainEvent::ConnectSucceeded {
            uri: uri.to_string(),
            params: options.params.clone(),
            profile: connected.clone(),
        });

        if options.save_the_connection || options.is_edit() {
            let saved = self
                .store
                .save_profile(&connected, matcher.as_ref())
                .await
                .store_err()?;
            self.status.update_connection_profile(saved.clone(), uri);

            self.events.emit(DomainEvent::ConnectionProfileAdded {
                profile: saved.clone(),
            });
            let event = match &options.params {
                Some(params) if params.is_edit_connection => DomainEvent::ConnectionProfileEdited {
                    old_profile_id: params.old_profile_id.clone().unwrap_or_default(),
                    profile: saved.clone(),
                },
                Some(_) => DomainEvent::ConnectionProfileCreated {
                    profile: saved.clone(),
                },
                None => DomainEvent::ConnectionProfileConnected {
                    profile: saved.clone(),
                },
            };
            self.events.emit(event);
            connected = saved;
        } else {
            connected.save_profile = false;
            self.status
                .update_connection_profile(connected.clone(), uri);
        }

        self.events.emit(DomainEvent::Connected {
            uri: uri.to_string(),
            profile: connected.clone(),
        });

        if connected.save_password {
            match self.store.save_password(&connected).await {
                Ok(true) => {}
                Ok(false) => warn!(uri = %uri, "[ConnectionManager] Password was not saved"),
                Err(e) => warn!(uri = %uri, error = %e, "[ConnectionManager] Failed to save password"),
            }
        }

        info!(uri = %uri, "[ConnectionManager] Connected");
        Ok(AttemptResult::Finished(ConnectOutcome::Connected {
            uri: uri.to_string(),
            profile: connected,
        }))
    }

    /// Register a status entry, send the request, await the notification
    async fn create_new_connection(
        &self,
        profile: ConnectionProfile,
        identity: ProfileIdentity,
        uri: &str,
    ) -> ConnectionResult<DialOutcome> {
        let provider_id = profile.provider_name.clone();
        let info = profile.to_connection_info();
        let ticket = self.status.add_connection(profile, identity, uri)?;

        if let Err(e) = self.dispatcher.connect(&provider_id, uri, info).await {
            error!(uri = %uri, provider_id = %provider_id, error = %e, "[ConnectionManager] Connect request failed");
            self.status.remove_attempt(uri, ticket.attempt_id);
            return Err(e);
        }
        self.status.mark_request_sent(uri, ticket.attempt_id);
        self.events.emit(DomainEvent::ConnectRequestSent {
            uri: uri.to_string(),
            provider_id,
        });

        let outcome = match ticket.receiver.await {
            Ok(Completion::Finished(summary)) if summary.is_success() => {
                match self.status.connection_profile(uri) {
                    Some(profile) => DialOutcome::Connected(profile),
                    None => DialOutcome::Abandoned,
                }
            }
            Ok(Completion::Finished(summary)) => {
                match summary.error_message.filter(|m| !m.is_empty()) {
                    Some(message) => DialOutcome::Failed(
                        ConnectFailure::provider_rejected(message, summary.error_code)
                            .with_details(summary.messages),
                    ),
                    None => DialOutcome::Failed(ConnectFailure::not_accepted()),
                }
            }
            Ok(Completion::Abandoned) | Err(_) => DialOutcome::Abandoned,
        };
        Ok(outcome)
    }

    // ════════════════════════════════════════════════════════════════════════
    // TOKEN REFRESH
    // ════════════════════════════════════════════════════════════════════════

    /// Reconnect `uri` when its Azure token is about to expire.
    ///
    /// Concurrent callers for one URI share a single reconnect and observe the
    /// same result. A failed reconnect is `TokenRefreshFailed`.
    pub async fn refresh_azure_account_token_if_necessary(
        self: &Arc<Self>,
        uri: &str,
    ) -> ConnectionResult<bool> {
        let Some(profile) = self.status.connection_profile(uri) else {
            warn!(uri = %uri, "[ConnectionManager] No profile for uri, skipping token refresh");
            return Ok(true);
        };

        if let Some(pending) = self.pending_reconnects.get(uri) {
            debug!(uri = %uri, "[ConnectionManager] Awaiting pending reconnect");
            return pending.await;
        }

        let is_azure = profile
            .authentication_type
            .as_ref()
            .map(AuthenticationType::is_azure_interactive)
            .unwrap_or(false);
        if !is_azure {
            return Ok(false);
        }

        let Some(remaining) = profile.token_seconds_remaining() else {
            warn!(uri = %uri, "[ConnectionManager] Token has no expiry, skipping refresh");
            return Ok(true);
        };
        let tolerance = self.settings.token_refresh_tolerance().as_secs() as i64;
        if remaining > tolerance {
            return Ok(true);
        }

        info!(uri = %uri, remaining_secs = remaining, "[ConnectionManager] Token near expiry, reconnecting");
        let manager = Arc::clone(self);
        let owned_uri = uri.to_string();
        let (operation, _) = self.pending_reconnects.join_or_start(uri, move || {
            async move {
                let reconnect = manager
                    .connect(profile, Some(owned_uri.clone()), ConnectOptions::default())
                    .await;
                match reconnect {
                    Ok(outcome) if outcome.is_connected() => Ok(true),
                    Ok(outcome) => Err(ConnectionError::TokenRefreshFailed {
                        uri: owned_uri,
                        reason: outcome
                            .error_message()
                            .unwrap_or("reconnect did not complete")
                            .to_string(),
                    }),
                    Err(e) => Err(ConnectionError::TokenRefreshFailed {
                        uri: owned_uri,
                        reason: e.to_string(),
                    }),
                }
            }
            .boxed()
        });
        operation.await
    }

    // ════════════════════════════════════════════════════════════════════════
    // DISCONNECT / CANCEL / RENAME
    // ════════════════════════════════════════════════════════════════════════

    /// Disconnect by URI or profile.
    ///
    /// A profile resolves to its generated URI, or else to any connection it
    /// opened. `Ok(false)` when none matches. A URI without a provider is
    /// `UnknownProviderForUri`.
    pub async fn disconnect(&self, target: ConnectionTarget) -> ConnectionResult<bool> {
        let uri = match target {
            ConnectionTarget::Uri(uri) => uri,
            ConnectionTarget::Profile(profile) => match self.resolve_profile_uri(&profile) {
                Some(uri) => uri,
                None => return Ok(false),
            },
        };

        if self.do_disconnect(&uri).await? {
            Ok(true)
        } else {
            error!(uri = %uri, "[ConnectionManager] Disconnect for uri without provider");
            Err(ConnectionError::UnknownProviderForUri(uri))
        }
    }

    fn resolve_profile_uri(&self, profile: &ConnectionProfile) -> Option<String> {
        let generated = generate_uri(profile, ConnectionPurpose::Connection);
        if self.status.uri_refers_to(&generated, profile) {
            return Some(generated);
        }
        self.status.find_by_profile(profile).map(|active| active.uri)
    }

    async fn do_disconnect(&self, uri: &str) -> ConnectionResult<bool> {
        let profile = self.status.connection_profile(uri);
        let sent = self.dispatcher.disconnect(uri).await?;
        if sent {
            self.status.delete_connection(uri);
            info!(uri = %uri, "[ConnectionManager] Disconnected");
            if let Some(profile) = profile {
                self.events.emit(DomainEvent::Disconnected {
                    uri: uri.to_string(),
                    profile,
                });
            }
        }
        Ok(sent)
    }

    /// Cancel a connect in progress.
    ///
    /// Local state is removed before the provider is told, so a late
    /// completion notification is ignored. Returns whether the cancel was sent.
    pub async fn cancel_connection_for_uri(&self, uri: &str) -> bool {
        if !self.status.is_connecting(uri) {
            return false;
        }
        self.in_flight.forget(uri);
        self.status.delete_connection(uri);
        info!(uri = %uri, "[ConnectionManager] Connect cancelled");

        match self.dispatcher.cancel_connect(uri).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(uri = %uri, error = %e, "[ConnectionManager] Cancel request failed");
                false
            }
        }
    }

    pub async fn cancel_connection(&self, profile: &ConnectionProfile) -> bool {
        match self.status.find_by_profile(profile) {
            Some(active) => self.cancel_connection_for_uri(&active.uri).await,
            None => false,
        }
    }

    /// Move a connection to a new URI. The old URI must have a provider.
    pub fn change_connection_uri(&self, new_uri: &str, old_uri: &str) -> ConnectionResult<()> {
        if self.dispatcher.provider_for_uri(old_uri).is_none() {
            error!(old_uri = %old_uri, new_uri = %new_uri, "[ConnectionManager] Rename of uri without provider");
            return Err(ConnectionError::UnknownProviderForUri(old_uri.to_string()));
        }
        if !self.status.change_connection_uri(new_uri, old_uri) {
            warn!(old_uri = %old_uri, new_uri = %new_uri, "[ConnectionManager] Renamed uri has no connection");
        }
        self.dispatcher.move_uri(new_uri, old_uri);
        Ok(())
    }

    /// Disconnect if needed, then remove the profile from the store
    pub async fn delete_connection(&self, profile: &ConnectionProfile) -> ConnectionResult<()> {
        let active = self
            .resolve_profile_uri(profile)
            .and_then(|uri| self.status.find_connection(&uri));
        if let Some(active) = active {
            if active.is_connected() {
                self.do_disconnect(&active.uri).await?;
            } else if active.is_connecting() {
                self.cancel_connection_for_uri(&active.uri).await;
            }
        }

        self.store.delete_connection(profile).await.store_err()?;
        info!(server = %profile.server_name, "[ConnectionManager] Profile deleted");
        self.events.emit(DomainEvent::ConnectionProfileDeleted {
            profile: profile.clone(),
        });
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // PASSTHROUGHS
    // ════════════════════════════════════════════════════════════════════════

    /// Database names, sorted. `None` unless the URI is connected.
    pub async fn list_databases(
        self: &Arc<Self>,
        uri: &str,
    ) -> ConnectionResult<Option<ListDatabasesResult>> {
        self.refresh_azure_account_token_if_necessary(uri).await?;
        if !self.status.is_connected(uri) {
            return Ok(None);
        }
        self.dispatcher.list_databases(uri).await
    }

    pub async fn change_database(self: &Arc<Self>, uri: &str, database: &str) -> ConnectionResult<bool> {
        self.refresh_azure_account_token_if_necessary(uri).await?;
        if !self.status.is_connected(uri) {
            return Ok(false);
        }
        let changed = self.dispatcher.change_database(uri, database).await?;
        if changed {
            self.status.update_database_name(uri, database);
        }
        Ok(changed)
    }

    pub async fn get_connection_string(
        &self,
        uri: &str,
        include_password: bool,
    ) -> ConnectionResult<Option<String>> {
        self.dispatcher
            .get_connection_string(uri, include_password)
            .await
    }

    /// Parse a connection string with `provider_id` or the default provider
    pub async fn build_connection_info(
        &self,
        connection_string: &str,
        provider_id: Option<&str>,
    ) -> ConnectionResult<ConnectionInfo> {
        let provider_id = match provider_id {
            Some(id) => id.to_string(),
            None => self.default_provider_id().ok_or_else(|| {
                ConnectionError::UnknownProvider(self.settings.default_engine.clone())
            })?,
        };
        self.dispatcher
            .build_connection_info(&provider_id, connection_string)
            .await
    }

    pub async fn change_password(
        &self,
        profile: &ConnectionProfile,
        new_password: &str,
    ) -> ConnectionResult<PasswordChangeResult> {
        let uri = generate_uri(profile, ConnectionPurpose::Connection);
        self.dispatcher
            .change_password(
                &profile.provider_name,
                &uri,
                profile.to_connection_info(),
                new_password,
            )
            .await
    }

    // ════════════════════════════════════════════════════════════════════════
    // LANGUAGE FLAVOR
    // ════════════════════════════════════════════════════════════════════════

    /// Associate `uri` with `provider_id` for the given language
    pub fn change_language_flavor(
        &self,
        uri: &str,
        language: &str,
        provider_id: &str,
    ) -> ConnectionResult<()> {
        if !self.dispatcher.has_provider(provider_id) {
            return Err(ConnectionError::UnknownProvider(provider_id.to_string()));
        }
        self.dispatcher.associate(uri, provider_id);
        self.events.emit(DomainEvent::LanguageFlavorChanged {
            uri: uri.to_string(),
            language: language.to_string(),
            flavor: provider_id.to_string(),
        });
        Ok(())
    }

    /// Give `uri` the default provider if it has none
    pub fn ensure_default_language_flavor(&self, uri: &str) {
        if self.dispatcher.provider_for_uri(uri).is_some() {
            return;
        }
        if let Some(provider_id) = self.default_provider_id() {
            if let Err(e) = self.change_language_flavor(uri, DEFAULT_LANGUAGE, &provider_id) {
                warn!(uri = %uri, error = %e, "[ConnectionManager] Failed to set default flavor");
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ════════════════════════════════════════════════════════════════════════

    pub fn is_connected(&self, uri: &str) -> bool {
        self.status.is_connected(uri)
    }

    pub fn is_connecting(&self, uri: &str) -> bool {
        self.status.is_connecting(uri)
    }

    /// Profile of a connected URI
    pub fn get_connection_profile(&self, uri: &str) -> Option<ConnectionProfile> {
        self.status
            .find_connection(uri)
            .filter(ActiveConnection::is_connected)
            .map(|active| active.profile)
    }

    pub fn find_connection(&self, uri: &str) -> Option<ActiveConnection> {
        self.status.find_connection(uri)
    }

    pub fn get_connection_uri(&self, profile: &ConnectionProfile) -> String {
        generate_uri(profile, ConnectionPurpose::Connection)
    }

    /// Connected URI for this profile and purpose
    pub fn find_existing_connection(
        &self,
        profile: &ConnectionProfile,
        purpose: ConnectionPurpose,
    ) -> Option<String> {
        let uri = generate_uri(profile, purpose);
        self.status.is_connected(&uri).then_some(uri)
    }

    pub fn is_profile_connected(&self, profile: &ConnectionProfile) -> bool {
        self.status
            .has_profile_in_state(profile, ConnectionState::Connected)
    }

    pub fn is_profile_connecting(&self, profile: &ConnectionProfile) -> bool {
        self.status
            .has_profile_in_state(profile, ConnectionState::Connecting)
    }

    /// Connected profiles, optionally limited to the given providers
    pub fn get_active_connections(&self, providers: Option<&[String]>) -> Vec<ConnectionProfile> {
        self.status.active_connections(providers)
    }

    pub fn provider_id_for_uri(&self, uri: &str) -> Option<String> {
        self.dispatcher.provider_for_uri(uri)
    }
}
