//! Per-attempt state for the connect retry loop

/// One pass through dial + completion for a single `connect` call.
///
/// Remediation (firewall rule or diagnostics) may only run on the first
/// attempt; a retry never allows it again, so a call dials at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    number: u8,
    remediation_allowed: bool,
    after_firewall: bool,
}

impl ConnectAttempt {
    pub fn first(remediation_allowed: bool) -> Self {
        Self {
            number: 1,
            remediation_allowed,
            after_firewall: false,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn remediation_allowed(&self) -> bool {
        self.remediation_allowed
    }

    /// Set when this attempt follows a successful firewall-rule dialog
    pub fn after_firewall(&self) -> bool {
        self.after_firewall
    }

    pub fn is_retry(&self) -> bool {
        self.number > 1
    }

    /// Next attempt after the user added a firewall rule
    pub fn retry_after_firewall(self) -> Option<Self> {
        self.retry().map(|next| Self {
            after_firewall: true,
            ..next
        })
    }

    /// Next attempt after diagnostics asked for a reconnect
    pub fn retry_after_diagnostics(self) -> Option<Self> {
        self.retry()
    }

    fn retry(self) -> Option<Self> {
        if !self.remediation_allowed {
            return None;
        }
        Some(Self {
            number: self.number + 1,
            remediation_allowed: false,
            after_firewall: false,
        })
    }
}
