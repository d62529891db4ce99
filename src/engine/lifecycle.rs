//! Engine process lifecycle management.
//!
//! Provides the `EngineSupervisor` struct which manages:
//! - Pre-flight validation of the engine build
//! - Process spawning with the benchmark launch arguments
//! - Readiness polling against the admin health endpoint
//! - Graceful shutdown with forceful fallback

use std::time::Duration;

use thiserror::Error;

use crate::admin::{AdminClient, AdminError, AdminResponse, HttpAdminClient};
use crate::defaults;
use crate::engine::process::{ChildLauncher, LaunchSpec, OutputTarget, ProcessHandle, ProcessLauncher};
use crate::options::SupervisorOptions;
use crate::preflight::{CheckCommand, PreflightError, PreflightValidator, ValidationResult};
use crate::readiness::{HealthSnapshot, Readiness, ReadinessPoller};

/// Name used for the engine's output file.
const DAEMON_NAME: &str = "hhvm";

/// Errors that can occur during engine lifecycle management.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Engine build is not suitable for benchmarking ({failures} failed check(s))")]
    PreflightFailed {
        failures: usize,
        diagnostics: Vec<String>,
    },

    #[error("Pre-flight validation failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error("Failed to start engine: {0}")]
    SpawnFailed(String),

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine {pid:?} accepted the stop request but is still running")]
    GracefulStopFailed { pid: Option<u32> },

    #[error("Admin request error: {0}")]
    Admin(#[from] AdminError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Supervisor state machine.
///
/// `Stopped -> Starting -> Ready -> Stopping -> Stopped`, with
/// `Starting -> Failed` when startup does not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Ready,
    Stopping,
    Failed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Ready => write!(f, "READY"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Non-fatal result of [`EngineSupervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Ready { attempts: u32 },
    /// Health checks ran out; the engine has been torn down.
    ReadinessTimeout { attempts: u32 },
}

impl StartOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// The running engine as seen by its supervisor.
pub struct SupervisedProcess {
    handle: Box<dyn ProcessHandle>,
    args: Vec<String>,
    output: OutputTarget,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }
}

enum GracefulStop {
    Confirmed,
    Persisted,
    Unavailable(String),
}

/// Supervises one engine process used as a benchmark target.
pub struct EngineSupervisor {
    options: SupervisorOptions,
    launcher: Box<dyn ProcessLauncher>,
    admin: Box<dyn AdminClient>,
    validator: PreflightValidator,
    poller: ReadinessPoller,
    process: Option<SupervisedProcess>,
    state: SupervisorState,
}

impl EngineSupervisor {
    /// Supervisor that spawns real processes and talks HTTP to the admin port.
    pub fn new(options: SupervisorOptions) -> Self {
        let admin = HttpAdminClient::new(options.admin_port);
        Self::with_collaborators(options, Box::new(ChildLauncher), Box::new(admin))
    }

    pub fn with_collaborators(
        options: SupervisorOptions,
        launcher: Box<dyn ProcessLauncher>,
        admin: Box<dyn AdminClient>,
    ) -> Self {
        let validator = PreflightValidator::new()
            .with_version_warning_pause(options.version_warning_pause)
            .with_trace(options.trace_subprocess);
        let poller = ReadinessPoller::new(defaults::HEALTH_PATH)
            .with_attempts(options.health_check_attempts, options.delay_check_health)
            .with_request_timeout(options.admin_request_timeout);

        Self {
            options,
            launcher,
            admin,
            validator,
            poller,
            process: None,
            state: SupervisorState::Stopped,
        }
    }

    /// Replace the readiness poller, e.g. to watch a different counter.
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn process(&self) -> Option<&SupervisedProcess> {
        self.process.as_ref()
    }

    pub fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .map(|p| p.handle.is_running())
            .unwrap_or(false)
    }

    /// Arguments the engine is launched with. Extra arguments come last so
    /// they override the defaults.
    pub fn engine_arguments(&self) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            "server".to_string(),
            "-p".to_string(),
            self.options.port.to_string(),
            "-v".to_string(),
            "Server.Type=fastcgi".to_string(),
            "-v".to_string(),
            "Eval.Jit=1".to_string(),
            "-v".to_string(),
            format!("AdminServer.Port={}", self.options.admin_port),
        ];
        if let Some(config) = &self.options.engine_config {
            args.push("-c".to_string());
            args.push(config.to_string_lossy().into_owned());
        }
        args.extend(self.options.extra_arguments.iter().cloned());
        args
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            program: self.options.binary.clone(),
            args: self.engine_arguments(),
            working_dir: self.options.working_dir.clone(),
            output: self.options.daemon_output(DAEMON_NAME),
        }
    }

    pub fn check_command(&self) -> CheckCommand {
        CheckCommand::for_engine(&self.options.binary, &self.options.check_script)
    }

    /// Validate, launch and wait for the engine to become ready.
    ///
    /// Readiness timeout is reported through [`StartOutcome`], not as an
    /// error; the engine has already been stopped in that case.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        if self.is_running() {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.process = None;
        self.state = SupervisorState::Starting;

        if let Err(e) = self.run_preflight().await {
            self.state = SupervisorState::Failed;
            return Err(e);
        }

        let spec = self.launch_spec();
        if self.options.trace_subprocess {
            eprintln!("{}", spec.shell_line());
        }

        let handle = match self.launcher.spawn(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                self.state = SupervisorState::Failed;
                return Err(LifecycleError::SpawnFailed(format!(
                    "could not launch {:?}: {}",
                    spec.program, e
                )));
            }
        };
        self.process = Some(SupervisedProcess {
            handle,
            args: spec.args,
            output: spec.output,
        });

        if !self.options.delay_process_launch.is_zero() {
            tokio::time::sleep(self.options.delay_process_launch).await;
        }

        if !self.is_running() {
            self.process = None;
            self.state = SupervisorState::Failed;
            return Err(LifecycleError::SpawnFailed(
                "engine exited immediately after launch".into(),
            ));
        }

        let readiness = match self.poller.poll_until_ready(self.admin.as_ref()).await {
            Ok(readiness) => readiness,
            Err(e) => {
                self.abandon_startup().await;
                return Err(e.into());
            }
        };

        match readiness {
            Readiness::Ready { attempts, .. } => {
                self.state = SupervisorState::Ready;
                Ok(StartOutcome::Ready { attempts })
            }
            Readiness::NotReady { attempts } => {
                log::warn!(
                    "Engine did not become ready after {} health check(s); stopping it",
                    attempts
                );
                self.abandon_startup().await;
                Ok(StartOutcome::ReadinessTimeout { attempts })
            }
        }
    }

    async fn run_preflight(&self) -> Result<()> {
        if self.options.not_benchmarking {
            log::warn!("Skipping build validation; results are not suitable for comparison");
            return Ok(());
        }

        match self.validator.validate(&self.check_command()).await? {
            ValidationResult::Pass => Ok(()),
            ValidationResult::Fail {
                failures,
                diagnostics,
            } => Err(LifecycleError::PreflightFailed {
                failures,
                diagnostics,
            }),
        }
    }

    async fn abandon_startup(&mut self) {
        if let Err(e) = self.stop().await {
            log::error!("Failed to stop engine after unsuccessful startup: {}", e);
        }
        self.state = SupervisorState::Failed;
    }

    /// Stop the engine: graceful admin `/stop` first, forceful termination
    /// when the admin path is unavailable.
    ///
    /// Calling this with no running engine is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            self.state = SupervisorState::Stopped;
            return Ok(());
        };

        if !process.handle.is_running() {
            log::debug!("Engine {:?} already exited", process.pid());
            self.state = SupervisorState::Stopped;
            return Ok(());
        }

        self.state = SupervisorState::Stopping;
        let result = self.shut_down(&mut process).await;
        self.state = SupervisorState::Stopped;
        result
    }

    async fn shut_down(&self, process: &mut SupervisedProcess) -> Result<()> {
        let graceful = match self.graceful_stop(process).await {
            Ok(graceful) => graceful,
            Err(e) => {
                self.force_terminate(process).await?;
                return Err(e.into());
            }
        };

        match graceful {
            GracefulStop::Confirmed => {
                log::info!("Engine {:?} stopped via admin request", process.pid());
                Ok(())
            }
            GracefulStop::Unavailable(reason) => {
                log::info!("Graceful stop unavailable ({}); terminating engine", reason);
                self.force_terminate(process).await
            }
            GracefulStop::Persisted => {
                self.force_terminate(process).await?;
                Err(LifecycleError::GracefulStopFailed { pid: process.pid() })
            }
        }
    }

    async fn graceful_stop(
        &self,
        process: &mut SupervisedProcess,
    ) -> std::result::Result<GracefulStop, AdminError> {
        let timeout = self.options.admin_request_timeout;

        let health = self.admin.request(defaults::HEALTH_PATH, timeout).await?;
        match HealthSnapshot::from_response(health) {
            HealthSnapshot::Unreachable(failure) => {
                return Ok(GracefulStop::Unavailable(failure.to_string()));
            }
            snapshot if !snapshot.is_truthy() => {
                return Ok(GracefulStop::Unavailable(
                    "health check returned no usable payload".into(),
                ));
            }
            _ => {}
        }

        if let AdminResponse::Failure(failure) =
            self.admin.request(defaults::STOP_PATH, timeout).await?
        {
            return Ok(GracefulStop::Unavailable(format!("stop request: {}", failure)));
        }

        if wait_until_exited(process, self.options.graceful_stop_timeout).await {
            Ok(GracefulStop::Confirmed)
        } else {
            Ok(GracefulStop::Persisted)
        }
    }

    async fn force_terminate(&self, process: &mut SupervisedProcess) -> Result<()> {
        process.handle.terminate(self.options.terminate_grace).await?;
        Ok(())
    }
}

async fn wait_until_exited(process: &mut SupervisedProcess, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !process.handle.is_running() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if process.handle.is_running() {
                log::warn!("Supervisor dropped with engine {:?} running; killing it", process.pid());
                if let Err(e) = process.handle.kill() {
                    log::error!("Failed to kill engine {:?}: {}", process.pid(), e);
                }
            }
        }
    }
}
