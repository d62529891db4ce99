//! Spawning the engine process.
//!
//! [`ProcessLauncher`] and [`ProcessHandle`] are the seams the supervisor
//! drives; [`ChildLauncher`] is the `tokio::process` implementation.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::engine::signals::{kill_child, terminate_child};
use crate::preflight::shell_line;

/// Where the engine's stdout/stderr go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Inherit,
    File(PathBuf),
}

/// Everything needed to launch the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputTarget,
}

impl LaunchSpec {
    pub fn shell_line(&self) -> String {
        shell_line(&self.program.to_string_lossy(), &self.args)
    }
}

/// A launched process, exclusively owned by its supervisor.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Whether the process is still running. Reaps it if it has exited.
    fn is_running(&mut self) -> bool;

    /// Forcefully terminate the process, allowing `grace` after SIGTERM
    /// before SIGKILL.
    async fn terminate(&mut self, grace: Duration) -> io::Result<()>;

    /// SIGKILL without waiting, for contexts that cannot await.
    fn kill(&mut self) -> io::Result<()>;
}

pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Launches engines with `tokio::process::Command`. Must be called from
/// within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildLauncher;

impl ProcessLauncher for ChildLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ProcessHandle>> {
        log::info!("Launching engine: {}", spec.shell_line());

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        if let OutputTarget::File(path) = &spec.output {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = File::create(path)?;
            command
                .stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file));
        }

        let child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "engine exited during spawn"))?;
        log::debug!("Engine spawned with PID {}", pid);
        Ok(Box::new(ChildProcess { child, pid }))
    }
}

/// [`ProcessHandle`] over a `tokio::process::Child`.
pub struct ChildProcess {
    child: Child,
    /// Kept after reaping, when `Child::id` no longer reports it.
    pid: u32,
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::debug!("Engine {} exited with {}", self.pid, status);
                false
            }
            Err(e) => {
                log::warn!("Failed to query engine {}: {}", self.pid, e);
                false
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        terminate_child(&mut self.child, grace).await
    }

    fn kill(&mut self) -> io::Result<()> {
        kill_child(&mut self.child)
    }
}
