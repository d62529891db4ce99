//! Engine supervisor - launch, validate, health-check and stop an HHVM-style
//! engine used as a benchmarking target.

mod defaults;
pub mod error;

pub mod admin;
pub mod engine;
pub mod options;
pub mod preflight;
pub mod readiness;

pub use error::{Error, Result};

pub use admin::{AdminClient, AdminError, AdminFailure, AdminResponse, HttpAdminClient};
pub use engine::lifecycle::{
    EngineSupervisor, LifecycleError, StartOutcome, SupervisedProcess, SupervisorState,
};
pub use engine::process::{
    ChildLauncher, ChildProcess, LaunchSpec, OutputTarget, ProcessHandle, ProcessLauncher,
};
pub use options::{OptionsError, SupervisorOptions};
pub use preflight::{
    CheckCommand, CheckEntry, PreflightError, PreflightReport, PreflightValidator,
    ValidationResult,
};
pub use readiness::{HealthSnapshot, Readiness, ReadinessPoller};

/// Admin endpoints served by the engine.
pub mod endpoints {
    pub use crate::defaults::{FAILURE_SENTINEL, HEALTH_PATH, STOP_PATH};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
