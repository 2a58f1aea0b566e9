//! Connection manager configuration

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::AuthenticationType;

const ENV_DEFAULT_ENGINE: &str = "SQLMUX_DEFAULT_ENGINE";
const ENV_DEFAULT_AUTH_TYPE: &str = "SQLMUX_DEFAULT_AUTHENTICATION_TYPE";
const ENV_TOKEN_TOLERANCE: &str = "SQLMUX_TOKEN_REFRESH_TOLERANCE_SECS";
const ENV_PROVIDER_TIMEOUT: &str = "SQLMUX_PROVIDER_READY_TIMEOUT_SECS";
const ENV_UNSUPPORTED_WARNING: &str = "SQLMUX_SHOW_UNSUPPORTED_SERVER_VERSION_WARNING";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerSettings {
    /// Provider id used when nothing else selects one
    pub default_engine: String,
    /// Applied to profiles without an authentication type, if the provider supports one
    pub default_authentication_type: String,
    /// Tokens expiring within this window are refreshed by reconnecting
    pub token_refresh_tolerance_secs: u64,
    /// How long dispatch waits for a provider to register; 0 waits forever
    pub provider_ready_timeout_secs: u64,
    pub show_unsupported_server_version_warning: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            default_engine: "MSSQL".to_string(),
            default_authentication_type: "SqlLogin".to_string(),
            token_refresh_tolerance_secs: 120,
            provider_ready_timeout_secs: 0,
            show_unsupported_server_version_warning: true,
        }
    }
}

impl ManagerSettings {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid connection manager settings")
    }

    /// Defaults overridden by `SQLMUX_*` environment variables (a `.env` file is honored)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut settings = Self::default();

        if let Ok(engine) = std::env::var(ENV_DEFAULT_ENGINE) {
            settings.default_engine = engine;
        }
        if let Ok(auth) = std::env::var(ENV_DEFAULT_AUTH_TYPE) {
            settings.default_authentication_type = auth;
        }
        if let Ok(value) = std::env::var(ENV_TOKEN_TOLERANCE) {
            settings.token_refresh_tolerance_secs = value
                .parse()
                .with_context(|| format!("{} must be an integer", ENV_TOKEN_TOLERANCE))?;
        }
        if let Ok(value) = std::env::var(ENV_PROVIDER_TIMEOUT) {
            settings.provider_ready_timeout_secs = value
                .parse()
                .with_context(|| format!("{} must be an integer", ENV_PROVIDER_TIMEOUT))?;
        }
        if let Ok(value) = std::env::var(ENV_UNSUPPORTED_WARNING) {
            settings.show_unsupported_server_version_warning = value
                .parse()
                .with_context(|| format!("{} must be true or false", ENV_UNSUPPORTED_WARNING))?;
        }

        Ok(settings)
    }

    pub fn with_default_engine(mut self, engine: impl Into<String>) -> Self {
        self.default_engine = engine.into();
        self
    }

    pub fn with_provider_ready_timeout(mut self, secs: u64) -> Self {
        self.provider_ready_timeout_secs = secs;
        self
    }

    pub fn default_auth_type(&self) -> Option<AuthenticationType> {
        if self.default_authentication_type.is_empty() {
            None
        } else {
            Some(AuthenticationType::from(
                self.default_authentication_type.as_str(),
            ))
        }
    }

    pub fn token_refresh_tolerance(&self) -> Duration {
        Duration::from_secs(self.token_refresh_tolerance_secs)
    }

    /// `None` means wait forever
    pub fn provider_ready_timeout(&self) -> Option<Duration> {
        match self.provider_ready_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
