use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use engine_supervisor::{
    EngineSupervisor, LifecycleError, OutputTarget, StartOutcome, SupervisorOptions,
};

#[derive(Debug, Parser)]
#[command(
    name = "engine-supervisor",
    version,
    about = "Launch an HHVM-style engine for benchmarking and supervise its lifecycle"
)]
struct Cli {
    /// TOML options file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine binary
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Script used for the pre-flight build check
    #[arg(long)]
    check_script: Option<PathBuf>,

    /// Engine ini file passed with -c
    #[arg(long)]
    engine_config: Option<PathBuf>,

    /// Directory for engine output files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// FastCGI port
    #[arg(long)]
    port: Option<u16>,

    /// Admin server port
    #[arg(long)]
    admin_port: Option<u16>,

    /// Delay before each health check
    #[arg(long)]
    delay_check_health: Option<humantime::Duration>,

    /// Delay after launching the engine
    #[arg(long)]
    delay_process_launch: Option<humantime::Duration>,

    /// Timeout for admin requests
    #[arg(long)]
    max_delay_admin_request: Option<humantime::Duration>,

    /// Number of health checks before giving up
    #[arg(long)]
    health_check_attempts: Option<u32>,

    /// Skip build validation. Results will not be suitable for comparison.
    #[arg(long)]
    i_am_not_benchmarking: bool,

    /// Print subprocess command lines to stderr
    #[arg(long)]
    trace_subprocess: bool,

    /// Extra engine arguments, appended after the defaults
    #[arg(last = true)]
    extra: Vec<String>,
}

impl Cli {
    fn into_options(self) -> Result<SupervisorOptions> {
        let mut options = SupervisorOptions::discover(self.config.as_deref())
            .context("Failed to load supervisor options")?;

        if let Some(binary) = self.binary {
            options.binary = binary;
        }
        if let Some(script) = self.check_script {
            options.check_script = script;
        }
        if self.engine_config.is_some() {
            options.engine_config = self.engine_config;
        }
        if self.output_dir.is_some() {
            options.output_dir = self.output_dir;
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(port) = self.admin_port {
            options.admin_port = port;
        }
        if let Some(delay) = self.delay_check_health {
            options.delay_check_health = delay.into();
        }
        if let Some(delay) = self.delay_process_launch {
            options.delay_process_launch = delay.into();
        }
        if let Some(timeout) = self.max_delay_admin_request {
            options.admin_request_timeout = timeout.into();
        }
        if let Some(attempts) = self.health_check_attempts {
            options.health_check_attempts = attempts;
        }
        options.not_benchmarking |= self.i_am_not_benchmarking;
        options.trace_subprocess |= self.trace_subprocess;
        options.extra_arguments.extend(self.extra);

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("engine_supervisor=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = Cli::parse().into_options()?;
    let mut supervisor = EngineSupervisor::new(options);

    match supervisor.start().await {
        Ok(StartOutcome::Ready { attempts }) => {
            log::info!("Engine ready after {} health check(s); Ctrl-C to stop", attempts);
            if let Some(process) = supervisor.process() {
                if let OutputTarget::File(path) = process.output() {
                    log::info!("Engine {:?} output goes to {}", process.pid(), path.display());
                }
            }
        }
        Ok(StartOutcome::ReadinessTimeout { attempts }) => {
            eprintln!("Engine failed to become ready after {} health check(s)", attempts);
            return Ok(ExitCode::FAILURE);
        }
        Err(LifecycleError::PreflightFailed { .. }) => {
            eprintln!(
                "Exiting due to invalid config. You can run anyway with \
                 --i-am-not-benchmarking, but the results will not be suitable for \
                 any kind of comparison."
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Failed to start engine"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    log::info!("Stopping engine");
    supervisor.stop().await.context("Failed to stop engine")?;
    Ok(ExitCode::SUCCESS)
}
