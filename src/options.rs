//! Supervisor configuration.
//!
//! Options can be deserialized from TOML (every field optional, durations as
//! humantime strings such as `"500ms"` or `"2s"`) and are then overridden by
//! command-line flags in the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults;
use crate::engine::process::OutputTarget;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to read options file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid options file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorOptions {
    /// Engine binary
    pub binary: PathBuf,
    /// Script run by the pre-flight config check
    pub check_script: PathBuf,
    /// Engine ini file passed with `-c`
    pub engine_config: Option<PathBuf>,
    /// Appended after the default launch arguments
    pub extra_arguments: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Directory for `<name>.out` output files; inherit stdio when unset
    pub output_dir: Option<PathBuf>,
    pub port: u16,
    pub admin_port: u16,

    #[serde(with = "humantime_serde")]
    pub delay_process_launch: Duration,
    #[serde(with = "humantime_serde")]
    pub delay_check_health: Duration,
    #[serde(with = "humantime_serde")]
    pub admin_request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub graceful_stop_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub terminate_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub version_warning_pause: Duration,
    pub health_check_attempts: u32,

    /// Skip build validation; results are not fit for comparison.
    pub not_benchmarking: bool,
    /// Print subprocess command lines to stderr.
    pub trace_subprocess: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(defaults::BINARY),
            check_script: PathBuf::from(defaults::CHECK_SCRIPT),
            engine_config: None,
            extra_arguments: Vec::new(),
            working_dir: None,
            output_dir: None,
            port: defaults::FASTCGI_PORT,
            admin_port: defaults::ADMIN_PORT,
            delay_process_launch: defaults::delay_process_launch(),
            delay_check_health: defaults::delay_check_health(),
            admin_request_timeout: defaults::admin_request_timeout(),
            graceful_stop_timeout: defaults::graceful_stop_timeout(),
            terminate_grace: defaults::terminate_grace(),
            version_warning_pause: defaults::version_warning_pause(),
            health_check_attempts: defaults::HEALTH_CHECK_ATTEMPTS,
            not_benchmarking: false,
            trace_subprocess: false,
        }
    }
}

impl SupervisorOptions {
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$XDG_CONFIG_HOME/engine-supervisor/supervisor.toml` or the platform
    /// equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("engine-supervisor").join("supervisor.toml"))
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, OptionsError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                log::debug!("Loading options from {:?}", path);
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Output destination for a daemon called `name`.
    pub fn daemon_output(&self, name: &str) -> OutputTarget {
        match &self.output_dir {
            Some(dir) => OutputTarget::File(dir.join(format!("{}.out", name))),
            None => OutputTarget::Inherit,
        }
    }
}
