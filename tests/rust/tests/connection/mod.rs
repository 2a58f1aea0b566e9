//! Connection lifecycle integration tests
//!
//! Tests for ConnectionManager connect, disconnect, remediation and token refresh.

mod refresh;
mod remediation;
