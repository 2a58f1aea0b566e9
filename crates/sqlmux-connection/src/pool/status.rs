//! Connection Status Table - per-URI lifecycle records
//!
//! Each live URI has exactly one entry. An entry is created when a connect
//! attempt registers, becomes `Connected` when the provider's completion
//! notification reports success, and is removed on failure, disconnect or
//! cancellation.
//!
//! Completion hand-off uses a oneshot channel per attempt: the notification
//! path takes the sender out of the entry, so an attempt is completed at most
//! once and notifications for removed or superseded entries are dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlmux_core::{
    option_keys, ChangedConnectionInfo, ConnectionError, ConnectionInfoSummary, ConnectionProfile,
    ServerInfo,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Lifecycle state of a status entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Set while an entry is being torn down; never observable from outside the table
    DisconnectedPendingCleanup,
}

/// What the waiting connect attempt receives
#[derive(Debug, Clone)]
pub enum Completion {
    Finished(ConnectionInfoSummary),
    /// The entry was deleted or replaced before the provider answered
    Abandoned,
}

/// Handed to the attempt that registered an entry
#[derive(Debug)]
pub struct AttemptTicket {
    pub attempt_id: u64,
    pub receiver: oneshot::Receiver<Completion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectDurations {
    /// Time spent before the provider accepted the request
    pub extension: Duration,
    /// Time the provider spent dialing
    pub service: Duration,
}

/// Result of delivering a completion notification
#[derive(Debug, Clone)]
pub enum CompletionDelivery {
    /// No live attempt was waiting for this URI
    Dropped,
    Succeeded {
        profile: ConnectionProfile,
        durations: ConnectDurations,
    },
    Failed {
        durations: ConnectDurations,
    },
}

/// Profile keys an entry answers to.
///
/// Captured when the attempt registers, so server-reported changes to the
/// stored profile (database, user) do not hide the connection from the
/// profile the caller connected with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileIdentity {
    id: Option<String>,
    fingerprints: Vec<String>,
}

impl ProfileIdentity {
    pub fn of(profile: &ConnectionProfile) -> Self {
        Self::default().with(profile)
    }

    pub fn with(mut self, profile: &ConnectionProfile) -> Self {
        self.absorb(profile);
        self
    }

    fn absorb(&mut self, profile: &ConnectionProfile) {
        if self.id.is_none() {
            self.id = profile.id.clone();
        }
        let fingerprint = profile.fingerprint();
        if !self.fingerprints.contains(&fingerprint) {
            self.fingerprints.push(fingerprint);
        }
    }

    fn merge(&mut self, other: &ProfileIdentity) {
        if self.id.is_none() {
            self.id = other.id.clone();
        }
        for fingerprint in &other.fingerprints {
            if !self.fingerprints.contains(fingerprint) {
                self.fingerprints.push(fingerprint.clone());
            }
        }
    }

    pub fn matches(&self, profile: &ConnectionProfile) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &profile.id) {
            return a == b;
        }
        self.fingerprints.contains(&profile.fingerprint())
    }

    fn overlaps(&self, other: &ProfileIdentity) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            return a == b;
        }
        self.fingerprints
            .iter()
            .any(|fingerprint| other.fingerprints.contains(fingerprint))
    }
}

#[derive(Debug)]
struct ConnectTimers {
    started: Instant,
    request_sent: Option<Instant>,
}

impl ConnectTimers {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            request_sent: None,
        }
    }

    fn durations(&self) -> ConnectDurations {
        let total = self.started.elapsed();
        let service = self
            .request_sent
            .map(|sent| sent.elapsed())
            .unwrap_or_default();
        ConnectDurations {
            extension: total.saturating_sub(service),
            service,
        }
    }
}

#[derive(Debug)]
struct ConnectionEntry {
    profile: ConnectionProfile,
    identity: ProfileIdentity,
    provider_id: String,
    state: ConnectionState,
    deleted: bool,
    server_info: Option<ServerInfo>,
    connection_id: Option<String>,
    attempt_id: u64,
    timers: ConnectTimers,
    completion: Option<oneshot::Sender<Completion>>,
}

impl ConnectionEntry {
    fn connecting(
        profile: ConnectionProfile,
        identity: ProfileIdentity,
        attempt_id: u64,
        completion: oneshot::Sender<Completion>,
    ) -> Self {
        Self {
            provider_id: profile.provider_name.clone(),
            profile,
            identity,
            state: ConnectionState::Connecting,
            deleted: false,
            server_info: None,
            connection_id: None,
            attempt_id,
            timers: ConnectTimers::start(),
            completion: Some(completion),
        }
    }

    fn is_live(&self) -> bool {
        !self.deleted
            && matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
    }

    /// Whether `profile` refers to this entry's connection
    fn refers_to(&self, profile: &ConnectionProfile) -> bool {
        self.identity.matches(profile) || self.profile.matches(profile)
    }

    fn is_same_connection(&self, identity: &ProfileIdentity) -> bool {
        self.identity.overlaps(identity) || identity.matches(&self.profile)
    }

    fn snapshot(&self, uri: &str) -> ActiveConnection {
        ActiveConnection {
            uri: uri.to_string(),
            profile: self.profile.clone(),
            provider_id: self.provider_id.clone(),
            state: self.state,
            server_info: self.server_info.clone(),
            connection_id: self.connection_id.clone(),
        }
    }

    fn abandon(&mut self) {
        self.deleted = true;
        self.state = ConnectionState::DisconnectedPendingCleanup;
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Completion::Abandoned);
        }
    }
}

/// Read-only copy of a status entry
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConnection {
    pub uri: String,
    pub profile: ConnectionProfile,
    pub provider_id: String,
    pub state: ConnectionState,
    pub server_info: Option<ServerInfo>,
    pub connection_id: Option<String>,
}

impl ActiveConnection {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }
}

pub struct ConnectionStatusTable {
    entries: DashMap<String, ConnectionEntry>,
    next_attempt: AtomicU64,
}

impl Default for ConnectionStatusTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatusTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_attempt: AtomicU64::new(1),
        }
    }

    fn next_attempt_id(&self) -> u64 {
        self.next_attempt.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connect attempt for `uri`.
    ///
    /// A live entry for the same connection is superseded (its waiter is told
    /// the attempt was abandoned) and its identity carried over. A live entry
    /// for a different connection is a caller bug and yields `UriInUse`.
    pub fn add_connection(
        &self,
        profile: ConnectionProfile,
        identity: ProfileIdentity,
        uri: &str,
    ) -> Result<AttemptTicket, ConnectionError> {
        let attempt_id = self.next_attempt_id();
        let (tx, rx) = oneshot::channel();
        let mut identity = identity.with(&profile);

        match self.entries.entry(uri.to_string()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                if existing.is_live() {
                    if !existing.is_same_connection(&identity) {
                        warn!(
                            uri = %uri,
                            existing = %existing.profile.fingerprint(),
                            requested = %profile.fingerprint(),
                            "[ConnectionStatus] URI already bound to a different profile"
                        );
                        return Err(ConnectionError::UriInUse(uri.to_string()));
                    }
                    identity.merge(&existing.identity);
                }
                debug!(uri = %uri, "[ConnectionStatus] Superseding existing entry");
                existing.abandon();
                occupied.insert(ConnectionEntry::connecting(profile, identity, attempt_id, tx));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ConnectionEntry::connecting(profile, identity, attempt_id, tx));
            }
        }
        debug!(uri = %uri, attempt_id, "[ConnectionStatus] Entry added, state = Connecting");

        Ok(AttemptTicket {
            attempt_id,
            receiver: rx,
        })
    }

    /// Record that the provider accepted the connect request for this attempt
    pub fn mark_request_sent(&self, uri: &str, attempt_id: u64) {
        if let Some(mut entry) = self.entries.get_mut(uri) {
            if entry.attempt_id == attempt_id && entry.timers.request_sent.is_none() {
                entry.timers.request_sent = Some(Instant::now());
            }
        }
    }

    /// Deliver a connection-complete notification.
    ///
    /// Success marks the entry `Connected` and copies server facts onto the
    /// profile; failure removes the entry. Either way the waiting attempt is
    /// released exactly once.
    pub fn complete(&self, summary: ConnectionInfoSummary) -> CompletionDelivery {
        let uri = summary.owner_uri.clone();

        let Entry::Occupied(mut occupied) = self.entries.entry(uri.clone()) else {
            debug!(uri = %uri, "[ConnectionStatus] Completion for unknown uri dropped");
            return CompletionDelivery::Dropped;
        };
        let entry = occupied.get_mut();
        if entry.deleted {
            info!(uri = %uri, "[ConnectionStatus] Completion for deleted entry dropped");
            return CompletionDelivery::Dropped;
        }
        let Some(tx) = entry.completion.take() else {
            debug!(uri = %uri, "[ConnectionStatus] Attempt already completed, notification dropped");
            return CompletionDelivery::Dropped;
        };
        let durations = entry.timers.durations();

        if summary.is_success() {
            entry.state = ConnectionState::Connected;
            entry.connection_id = summary.connection_id.clone();
            if let Some(db) = summary
                .connection_summary
                .as_ref()
                .map(|s| s.database_name.clone())
                .filter(|name| !name.is_empty())
            {
                entry.profile.database_name = db;
            }
            if let Some(server_info) = &summary.server_info {
                entry
                    .profile
                    .options
                    .insert(option_keys::IS_CLOUD.to_string(), Value::Bool(server_info.is_cloud));
                if !server_info.server_version.is_empty() {
                    entry.profile.options.insert(
                        option_keys::SERVER_VERSION.to_string(),
                        Value::String(server_info.server_version.clone()),
                    );
                }
                entry.server_info = Some(server_info.clone());
            }
            let profile = entry.profile.clone();
            let _ = tx.send(Completion::Finished(summary));
            CompletionDelivery::Succeeded { profile, durations }
        } else {
            info!(uri = %uri, "[ConnectionStatus] Connect failed, removing entry");
            let mut removed = occupied.remove();
            removed.state = ConnectionState::DisconnectedPendingCleanup;
            let _ = tx.send(Completion::Finished(summary));
            CompletionDelivery::Failed { durations }
        }
    }

    /// Mark the entry deleted, release its waiter and remove it
    pub fn delete_connection(&self, uri: &str) -> bool {
        match self.entries.remove(uri) {
            Some((_, mut entry)) => {
                entry.abandon();
                debug!(uri = %uri, "[ConnectionStatus] Entry deleted");
                true
            }
            None => false,
        }
    }

    /// Remove the entry only if it still belongs to `attempt_id`
    pub fn remove_attempt(&self, uri: &str, attempt_id: u64) -> bool {
        match self
            .entries
            .remove_if(uri, |_, entry| entry.attempt_id == attempt_id)
        {
            Some((_, mut entry)) => {
                entry.abandon();
                true
            }
            None => false,
        }
    }

    pub fn has_connection(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn is_connected(&self, uri: &str) -> bool {
        self.entries
            .get(uri)
            .map(|e| !e.deleted && e.state == ConnectionState::Connected)
            .unwrap_or(false)
    }

    pub fn is_connecting(&self, uri: &str) -> bool {
        self.entries
            .get(uri)
            .map(|e| !e.deleted && e.state == ConnectionState::Connecting)
            .unwrap_or(false)
    }

    pub fn find_connection(&self, uri: &str) -> Option<ActiveConnection> {
        self.entries.get(uri).map(|e| e.snapshot(uri))
    }

    /// Profile of the live entry, connecting or connected
    pub fn connection_profile(&self, uri: &str) -> Option<ConnectionProfile> {
        self.entries.get(uri).map(|e| e.profile.clone())
    }

    /// Whether the entry on `uri` belongs to `profile`
    pub fn uri_refers_to(&self, uri: &str, profile: &ConnectionProfile) -> bool {
        self.entries
            .get(uri)
            .map(|e| !e.deleted && e.refers_to(profile))
            .unwrap_or(false)
    }

    /// First entry, by URI, that belongs to `profile`
    pub fn find_by_profile(&self, profile: &ConnectionProfile) -> Option<ActiveConnection> {
        let mut found: Vec<ActiveConnection> = self
            .entries
            .iter()
            .filter(|e| !e.deleted && e.refers_to(profile))
            .map(|e| e.snapshot(e.key()))
            .collect();
        found.sort_by(|a, b| a.uri.cmp(&b.uri));
        found.into_iter().next()
    }

    /// Any live entry for `profile` is in `state`
    pub fn has_profile_in_state(&self, profile: &ConnectionProfile, state: ConnectionState) -> bool {
        self.entries
            .iter()
            .any(|e| !e.deleted && e.state == state && e.refers_to(profile))
    }

    /// Move an entry to a new URI, keeping its state and waiter
    pub fn change_connection_uri(&self, new_uri: &str, old_uri: &str) -> bool {
        match self.entries.remove(old_uri) {
            Some((_, entry)) => {
                if let Some(mut displaced) = self.entries.insert(new_uri.to_string(), entry) {
                    displaced.abandon();
                }
                info!(old_uri = %old_uri, new_uri = %new_uri, "[ConnectionStatus] Entry renamed");
                true
            }
            None => false,
        }
    }

    /// Replace the profile without touching lifecycle state
    pub fn update_connection_profile(&self, profile: ConnectionProfile, uri: &str) -> bool {
        match self.entries.get_mut(uri) {
            Some(mut entry) => {
                entry.identity.absorb(&profile);
                entry.profile = profile;
                true
            }
            None => false,
        }
    }

    pub fn update_database_name(&self, uri: &str, database: &str) -> bool {
        match self.entries.get_mut(uri) {
            Some(mut entry) => {
                entry.profile.database_name = database.to_string();
                true
            }
            None => false,
        }
    }

    /// Apply a provider-reported change of target; returns the updated profile
    pub fn on_connection_changed(&self, changed: &ChangedConnectionInfo) -> Option<ConnectionProfile> {
        let mut entry = self.entries.get_mut(&changed.connection_uri)?;
        let summary = &changed.connection;
        if !summary.server_name.is_empty() {
            entry.profile.server_name = summary.server_name.clone();
        }
        entry.profile.database_name = summary.database_name.clone();
        if !summary.user_name.is_empty() {
            entry.profile.user_name = summary.user_name.clone();
        }
        Some(entry.profile.clone())
    }

    /// Connected profiles, one per logical connection, optionally filtered by provider
    pub fn active_connections(&self, providers: Option<&[String]>) -> Vec<ConnectionProfile> {
        let mut connected: Vec<(String, ConnectionProfile)> = self
            .entries
            .iter()
            .filter(|e| !e.deleted && e.state == ConnectionState::Connected)
            .filter(|e| {
                providers
                    .map(|ids| ids.iter().any(|id| id == &e.provider_id))
                    .unwrap_or(true)
            })
            .map(|e| (e.key().clone(), e.profile.clone()))
            .collect();
        connected.sort_by(|a, b| a.0.cmp(&b.0));

        let mut seen = HashSet::new();
        connected
            .into_iter()
            .filter(|(_, profile)| seen.insert(profile.fingerprint()))
            .map(|(_, profile)| profile)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
