//! Collaborator contracts
//!
//! Everything the connection manager talks to besides the connection store:
//! backend providers, the account service, firewall remediation, the
//! connection dialog and optional error diagnostics.

mod account_service;
mod dialog_service;
mod diagnostics_service;
mod firewall_service;
mod provider;

pub use account_service::AccountManagementService;
pub use dialog_service::{ConnectionDialogService, DialogRequest, DialogResponse};
pub use diagnostics_service::{ErrorDiagnosticsService, ErrorHandleResult};
pub use firewall_service::{FirewallRuleResponse, FirewallRuleService};
pub use provider::ConnectionProvider;
