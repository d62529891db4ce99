//! Engine management for the benchmark target.
//!
//! This module provides:
//! - Process spawning and handles (`process`)
//! - Forceful termination and reaping (`signals`)
//! - The supervisor state machine (`lifecycle`)

pub mod lifecycle;
pub mod process;
pub mod signals;

pub use lifecycle::{EngineSupervisor, LifecycleError, StartOutcome, SupervisorState};
pub use process::{ChildLauncher, LaunchSpec, OutputTarget, ProcessHandle, ProcessLauncher};
