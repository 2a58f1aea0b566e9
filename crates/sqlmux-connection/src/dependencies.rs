//! Dependency Injection Container
//!
//! Collaborators of the connection manager. The store and the event sender
//! are required; every other service is optional and its recovery path is
//! skipped when absent.

use std::sync::Arc;

use sqlmux_core::{
    AccountManagementService, ConnectionDialogService, ConnectionStore, ErrorDiagnosticsService,
    EventSender, FirewallRuleService, ManagerSettings,
};

/// Dependency container for ConnectionManager
#[derive(Clone)]
pub struct ManagerDependencies {
    pub settings: ManagerSettings,

    // Persistence
    pub store: Arc<dyn ConnectionStore>,

    // Collaborators
    pub account_service: Option<Arc<dyn AccountManagementService>>,
    pub firewall: Option<Arc<dyn FirewallRuleService>>,
    pub dialog: Option<Arc<dyn ConnectionDialogService>>,
    pub diagnostics: Option<Arc<dyn ErrorDiagnosticsService>>,

    /// Domain events go out through this sender
    pub events: EventSender,
}

/// Builder for ManagerDependencies
pub struct DependenciesBuilder {
    settings: Option<ManagerSettings>,
    store: Option<Arc<dyn ConnectionStore>>,
    account_service: Option<Arc<dyn AccountManagementService>>,
    firewall: Option<Arc<dyn FirewallRuleService>>,
    dialog: Option<Arc<dyn ConnectionDialogService>>,
    diagnostics: Option<Arc<dyn ErrorDiagnosticsService>>,
    events: Option<EventSender>,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            store: None,
            account_service: None,
            firewall: None,
            dialog: None,
            diagnostics: None,
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConnectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_account_service(mut self, service: Arc<dyn AccountManagementService>) -> Self {
        self.account_service = Some(service);
        self
    }

    pub fn with_firewall(mut self, service: Arc<dyn FirewallRuleService>) -> Self {
        self.firewall = Some(service);
        self
    }

    pub fn with_dialog(mut self, service: Arc<dyn ConnectionDialogService>) -> Self {
        self.dialog = Some(service);
        self
    }

    pub fn with_diagnostics(mut self, service: Arc<dyn ErrorDiagnosticsService>) -> Self {
        self.diagnostics = Some(service);
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<ManagerDependencies, String> {
        Ok(ManagerDependencies {
            settings: self.settings.unwrap_or_default(),
            store: self.store.ok_or("store is required")?,
            account_service: self.account_service,
            firewall: self.firewall,
            dialog: self.dialog,
            diagnostics: self.diagnostics,
            events: self.events.ok_or("event sender is required")?,
        })
    }
}

impl Default for DependenciesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
