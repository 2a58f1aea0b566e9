use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ConnectFailure, ConnectionProfile};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorHandleResult {
    pub handled: bool,
    /// Ask the manager to retry once with `options` applied
    pub reconnect: bool,
    /// Replacement option bag for the profile
    pub options: Option<BTreeMap<String, Value>>,
}

/// Provider-specific troubleshooting for connection errors
#[async_trait]
pub trait ErrorDiagnosticsService: Send + Sync {
    async fn try_handle_connection_error(
        &self,
        failure: &ConnectFailure,
        provider_id: &str,
        profile: &ConnectionProfile,
    ) -> anyhow::Result<ErrorHandleResult>;
}
