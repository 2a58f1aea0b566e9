//! Backend provider contract

use async_trait::async_trait;

use crate::domain::{ConnectionInfo, ListDatabasesResult, PasswordChangeResult};

/// A pluggable backend for one data-engine family
///
/// `connect` only sends the request. The outcome is pushed back later through
/// the manager's connection-complete notification, keyed by the same URI.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self, uri: &str, info: ConnectionInfo) -> anyhow::Result<()>;

    async fn disconnect(&self, uri: &str) -> anyhow::Result<bool>;

    async fn cancel_connect(&self, uri: &str) -> anyhow::Result<bool>;

    async fn list_databases(&self, uri: &str) -> anyhow::Result<ListDatabasesResult>;

    async fn change_database(&self, uri: &str, database: &str) -> anyhow::Result<bool>;

    async fn get_connection_string(
        &self,
        uri: &str,
        include_password: bool,
    ) -> anyhow::Result<String>;

    async fn build_connection_info(&self, connection_string: &str)
        -> anyhow::Result<ConnectionInfo>;

    async fn change_password(
        &self,
        uri: &str,
        info: ConnectionInfo,
        new_password: &str,
    ) -> anyhow::Result<PasswordChangeResult>;
}
