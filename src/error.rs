//! Error types for the engine supervisor.

use thiserror::Error;

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine lifecycle error
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] crate::engine::lifecycle::LifecycleError),

    /// Pre-flight validation error
    #[error("Pre-flight error: {0}")]
    Preflight(#[from] crate::preflight::PreflightError),

    /// Misconfigured admin request
    #[error("Admin error: {0}")]
    Admin(#[from] crate::admin::AdminError),

    /// Options loading error
    #[error("Options error: {0}")]
    Options(#[from] crate::options::OptionsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;
