use async_trait::async_trait;

use crate::domain::{ConnectFailure, ConnectOptions, ConnectionProfile, DialogParams};

/// What the dialog is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct DialogRequest {
    pub params: DialogParams,
    pub profile: Option<ConnectionProfile>,
    /// Failure of the attempt that led to the dialog, if any
    pub last_error: Option<ConnectFailure>,
    pub options: ConnectOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogResponse {
    /// The user corrected the profile; the manager connects with it
    Submitted(ConnectionProfile),
    Cancelled,
}

#[async_trait]
pub trait ConnectionDialogService: Send + Sync {
    async fn show_dialog(&self, request: DialogRequest) -> anyhow::Result<DialogResponse>;
}
