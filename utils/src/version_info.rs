//! Version information for the service, populated at build time.
//!
//! Environment display format:
//! - Prod: `stable:{version}`
//! - Staging: `staging:{commit}`
//! - Local/Test: `main:{commit}`

/// Runtime environment the service was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    /// Local development
    Local,
    /// Automated test runs
    Test,
    /// Pre-production
    Staging,
    /// Production
    Prod,
}

/// Get the build date in RFC3339 format
pub fn build_date() -> &'static str {
    env!("BUILD_DATE")
}

/// Get the git commit hash (short)
pub fn build_commit() -> &'static str {
    env!("BUILD_COMMIT")
}

/// Get the package version
pub fn build_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Format version string for a runtime-determined environment.
///
/// Uses build-time constants for commit and version.
pub fn format_version_for_runtime_env(env: RuntimeEnv) -> String {
    match env {
        RuntimeEnv::Staging => format!("staging:{}", build_commit()),
        RuntimeEnv::Test | RuntimeEnv::Local => format!("main:{}", build_commit()),
        RuntimeEnv::Prod => format!("stable:{}", build_version()),
    }
}
