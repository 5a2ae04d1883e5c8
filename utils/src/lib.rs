//! Shared utilities for the car rental workspace.
//!
//! Holds build metadata that both the service binary and its health
//! endpoint report.

pub mod version_info;
