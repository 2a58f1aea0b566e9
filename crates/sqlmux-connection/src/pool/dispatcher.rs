//! Provider Dispatcher - routes calls to registered providers
//!
//! A provider id maps to a slot holding its declared properties and a
//! readiness channel. Calls for a provider that has not registered yet wait on
//! the channel; registration fills it exactly once. Slots are never removed.
//!
//! The dispatcher also remembers which provider owns each URI so that
//! URI-only calls (disconnect, cancel, list databases) can be routed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sqlmux_core::{
    ConnectionError, ConnectionInfo, ConnectionProvider, ConnectionResult, ConnectionResultExt,
    ListDatabasesResult, PasswordChangeResult, ProviderProperties,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type ProviderHandle = Arc<dyn ConnectionProvider>;

struct ProviderSlot {
    properties: Option<ProviderProperties>,
    ready: watch::Sender<Option<ProviderHandle>>,
}

impl ProviderSlot {
    fn new() -> Self {
        let (ready, _) = watch::channel(None);
        Self {
            properties: None,
            ready,
        }
    }

    fn is_registered(&self) -> bool {
        self.ready.borrow().is_some()
    }
}

pub struct ProviderDispatcher {
    providers: DashMap<String, ProviderSlot>,
    uri_to_provider: DashMap<String, String>,
    ready_timeout: Option<Duration>,
}

impl ProviderDispatcher {
    /// `ready_timeout` of `None` waits forever for late registration
    pub fn new(ready_timeout: Option<Duration>) -> Self {
        Self {
            providers: DashMap::new(),
            uri_to_provider: DashMap::new(),
            ready_timeout,
        }
    }

    /// Record provider metadata; the implementation may register later
    pub fn declare_provider(&self, properties: ProviderProperties) {
        let id = properties.provider_id.clone();
        self.providers
            .entry(id.clone())
            .or_insert_with(ProviderSlot::new)
            .properties = Some(properties);
        debug!(provider_id = %id, "[ProviderDispatcher] Provider declared");
    }

    /// Resolve the provider's readiness handle. Fails on a second registration.
    pub fn register_provider(
        &self,
        provider_id: &str,
        provider: ProviderHandle,
    ) -> ConnectionResult<()> {
        let slot = self
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(ProviderSlot::new);
        if slot.is_registered() {
            warn!(provider_id = %provider_id, "[ProviderDispatcher] Duplicate registration rejected");
            return Err(ConnectionError::ProviderAlreadyRegistered(
                provider_id.to_string(),
            ));
        }
        slot.ready.send_replace(Some(provider));
        info!(provider_id = %provider_id, "[ProviderDispatcher] Provider registered");
        Ok(())
    }

    /// Declared or registered
    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn is_ready(&self, provider_id: &str) -> bool {
        self.providers
            .get(provider_id)
            .map(|slot| slot.is_registered())
            .unwrap_or(false)
    }

    pub fn properties(&self, provider_id: &str) -> Option<ProviderProperties> {
        self.providers
            .get(provider_id)
            .and_then(|slot| slot.properties.clone())
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Wait until `provider_id` has registered
    pub async fn ready(&self, provider_id: &str) -> ConnectionResult<ProviderHandle> {
        let mut rx = self
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(ProviderSlot::new)
            .ready
            .subscribe();

        if rx.borrow().is_none() {
            debug!(provider_id = %provider_id, "[ProviderDispatcher] Waiting for provider registration");
        }

        let provider = {
            let wait = rx.wait_for(Option::is_some);
            let waited = match self.ready_timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                    ConnectionError::ProviderNotReady {
                        provider_id: provider_id.to_string(),
                        waited_secs: limit.as_secs(),
                    }
                })?,
                None => wait.await,
            };
            let value =
                waited.map_err(|_| ConnectionError::UnknownProvider(provider_id.to_string()))?;
            value.clone()
        };

        provider.ok_or_else(|| ConnectionError::UnknownProvider(provider_id.to_string()))
    }

    /// Run `call` against the provider once it is ready
    pub async fn send<T, F, Fut>(&self, provider_id: &str, call: F) -> ConnectionResult<T>
    where
        F: FnOnce(ProviderHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let provider = self.ready(provider_id).await?;
        call(provider).await.provider_err()
    }

    pub fn provider_for_uri(&self, uri: &str) -> Option<String> {
        self.uri_to_provider.get(uri).map(|e| e.value().clone())
    }

    pub fn associate(&self, uri: &str, provider_id: &str) {
        self.uri_to_provider
            .insert(uri.to_string(), provider_id.to_string());
    }

    /// Move the URI association; false when the old URI has none
    pub fn move_uri(&self, new_uri: &str, old_uri: &str) -> bool {
        match self.uri_to_provider.remove(old_uri) {
            Some((_, provider_id)) => {
                self.uri_to_provider.insert(new_uri.to_string(), provider_id);
                true
            }
            None => false,
        }
    }

    /// Send a connect request. Returns once the provider accepted it.
    pub async fn connect(
        &self,
        provider_id: &str,
        uri: &str,
        info: ConnectionInfo,
    ) -> ConnectionResult<()> {
        self.associate(uri, provider_id);
        let owned_uri = uri.to_string();
        self.send(provider_id, move |provider| async move {
            provider.connect(&owned_uri, info).await
        })
        .await
    }

    /// `Ok(false)` when no provider is associated with the URI
    pub async fn disconnect(&self, uri: &str) -> ConnectionResult<bool> {
        let Some(provider_id) = self.provider_for_uri(uri) else {
            return Ok(false);
        };
        let owned_uri = uri.to_string();
        let accepted = self
            .send(&provider_id, move |provider| async move {
                provider.disconnect(&owned_uri).await
            })
            .await?;
        debug!(uri = %uri, accepted, "[ProviderDispatcher] Disconnect sent");
        Ok(true)
    }

    /// `Ok(false)` when no provider is associated with the URI
    pub async fn cancel_connect(&self, uri: &str) -> ConnectionResult<bool> {
        let Some(provider_id) = self.provider_for_uri(uri) else {
            return Ok(false);
        };
        let owned_uri = uri.to_string();
        let accepted = self
            .send(&provider_id, move |provider| async move {
                provider.cancel_connect(&owned_uri).await
            })
            .await?;
        debug!(uri = %uri, accepted, "[ProviderDispatcher] Cancel sent");
        Ok(true)
    }

    /// Database names sorted lexicographically
    pub async fn list_databases(&self, uri: &str) -> ConnectionResult<Option<ListDatabasesResult>> {
        let Some(provider_id) = self.provider_for_uri(uri) else {
            return Ok(None);
        };
        let owned_uri = uri.to_string();
        let mut result = self
            .send(&provider_id, move |provider| async move {
                provider.list_databases(&owned_uri).await
            })
            .await?;
        result.database_names.sort();
        Ok(Some(result))
    }

    pub async fn change_database(&self, uri: &str, database: &str) -> ConnectionResult<bool> {
        let Some(provider_id) = self.provider_for_uri(uri) else {
            return Ok(false);
        };
        let owned_uri = uri.to_string();
        let database = database.to_string();
        self.send(&provider_id, move |provider| async move {
            provider.change_database(&owned_uri, &database).await
        })
        .await
    }

    pub async fn get_connection_string(
        &self,
        uri: &str,
        include_password: bool,
    ) -> ConnectionResult<Option<String>> {
        let Some(provider_id) = self.provider_for_uri(uri) else {
            return Ok(None);
        };
        let owned_uri = uri.to_string();
        self.send(&provider_id, move |provider| async move {
            provider
                .get_connection_string(&owned_uri, include_password)
                .await
        })
        .await
        .map(Some)
    }

    pub async fn build_connection_info(
        &self,
        provider_id: &str,
        connection_string: &str,
    ) -> ConnectionResult<ConnectionInfo> {
        let connection_string = connection_string.to_string();
        self.send(provider_id, move |provider| async move {
            provider.build_connection_info(&connection_string).await
        })
        .await
    }

    pub async fn change_password(
        &self,
        provider_id: &str,
        uri: &str,
        info: ConnectionInfo,
        new_password: &str,
    ) -> ConnectionResult<PasswordChangeResult> {
        let owned_uri = uri.to_string();
        let new_password = new_password.to_string();
        self.send(provider_id, move |provider| async move {
            provider
                .change_password(&owned_uri, info, &new_password)
                .await
        })
        .await
    }
}
