//! Pre-flight validation of the engine build.
//!
//! Runs the engine once against a config-check script which prints a JSON
//! report of the build's settings:
//!
//! ```text
//! { "<check>": { "Value": .., "Required Value": .., "OK": bool }, ..,
//!   "HHVM_VERSION": "3.4.0" }
//! ```
//!
//! Every failed check disqualifies the build for benchmarking. An engine
//! older than the minimum supported version cannot report reliably, so that
//! only produces a warning.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::defaults;

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Got invalid output from config check: {0}")]
    MalformedReport(String),

    #[error("Failed to run config check: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PreflightError>;

/// One entry of the check report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckEntry {
    #[serde(rename = "Value")]
    pub observed: Value,
    #[serde(rename = "Required Value")]
    pub required: Value,
    #[serde(rename = "OK")]
    pub ok: bool,
}

/// Parsed output of the config-check command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreflightReport {
    pub version: Option<String>,
    /// Checks in the order the report lists them.
    pub checks: Vec<(String, CheckEntry)>,
}

impl PreflightReport {
    pub fn parse(output: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(output.trim())
            .map_err(|e| PreflightError::MalformedReport(e.to_string()))?;

        let Value::Object(entries) = value else {
            return Err(PreflightError::MalformedReport(
                "expected a JSON object".into(),
            ));
        };
        if entries.is_empty() {
            return Err(PreflightError::MalformedReport("report is empty".into()));
        }

        let mut report = PreflightReport::default();
        for (name, data) in entries {
            if name == defaults::VERSION_CHECK {
                report.version = Some(match data {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
                continue;
            }

            let entry: CheckEntry = serde_json::from_value(data).map_err(|e| {
                PreflightError::MalformedReport(format!("check {}: {}", name, e))
            })?;
            report.checks.push((name, entry));
        }

        Ok(report)
    }

    /// The reported version, if it is older than `minimum`.
    pub fn outdated_version(&self, minimum: &str) -> Option<&str> {
        self.version
            .as_deref()
            .filter(|v| compare_versions(v, minimum) == Ordering::Less)
    }
}

/// Verdict on a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Pass,
    Fail {
        failures: usize,
        diagnostics: Vec<String>,
    },
}

impl ValidationResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Command line used to run the config check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CheckCommand {
    /// `<binary> -v Eval.Jit=1 <script>`
    pub fn for_engine(binary: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        let script: PathBuf = script.into();
        Self {
            program: binary.into(),
            args: vec![
                "-v".into(),
                "Eval.Jit=1".into(),
                script.to_string_lossy().into_owned(),
            ],
        }
    }

    pub fn shell_line(&self) -> String {
        shell_line(&self.program.to_string_lossy(), &self.args)
    }
}

/// Shell-escaped rendering of a command for tracing.
pub fn shell_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Runs the config check and judges its report.
#[derive(Debug, Clone)]
pub struct PreflightValidator {
    min_version: String,
    version_warning_pause: Duration,
    trace: bool,
}

impl Default for PreflightValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PreflightValidator {
    pub fn new() -> Self {
        Self {
            min_version: defaults::MIN_SUPPORTED_VERSION.to_string(),
            version_warning_pause: defaults::version_warning_pause(),
            trace: false,
        }
    }

    pub fn with_version_warning_pause(mut self, pause: Duration) -> Self {
        self.version_warning_pause = pause;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Run `command`, parse its report and evaluate it.
    ///
    /// Diagnostics for failed checks and the outdated-version warning are
    /// printed to stderr for the operator.
    pub async fn validate(&self, command: &CheckCommand) -> Result<ValidationResult> {
        if self.trace {
            eprintln!("{}", command.shell_line());
        }

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.stderr.is_empty() {
            log::debug!(
                "Config check stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !output.status.success() {
            log::warn!("Config check exited with {}", output.status);
        }

        let report = PreflightReport::parse(&String::from_utf8_lossy(&output.stdout))?;

        if let Some(warning) = self.version_warning(&report) {
            let version = report.version.as_deref().unwrap_or("unknown");
            log::warn!("Engine version {} predates {}", version, self.min_version);
            eprintln!("WARNING: {}", warning);
            tokio::time::sleep(self.version_warning_pause).await;
        }

        let result = self.evaluate(&report);
        if let ValidationResult::Fail { diagnostics, .. } = &result {
            for diagnostic in diagnostics {
                eprintln!("Engine build is not suitable for benchmarking:\n  {}", diagnostic);
            }
        }
        Ok(result)
    }

    /// Operator warning for an engine too old to report its build reliably.
    pub fn version_warning(&self, report: &PreflightReport) -> Option<String> {
        report.outdated_version(&self.min_version).map(|version| {
            format!(
                "Unable to confirm the engine is built correctly. This is supported in \
                 {} or later - detected {}. Please make sure that your build is a \
                 release build, and is built against libpcre with JIT support.",
                self.min_version, version
            )
        })
    }

    /// Count failed checks. The version entry never counts as a failure.
    pub fn evaluate(&self, report: &PreflightReport) -> ValidationResult {
        let diagnostics: Vec<String> = report
            .checks
            .iter()
            .filter(|(_, entry)| !entry.ok)
            .map(|(name, entry)| {
                format!(
                    "{}: {} vs required {}",
                    name,
                    display_value(&entry.observed),
                    display_value(&entry.required)
                )
            })
            .collect();

        if diagnostics.is_empty() {
            ValidationResult::Pass
        } else {
            ValidationResult::Fail {
                failures: diagnostics.len(),
                diagnostics,
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare dotted version strings.
///
/// Numeric components compare numerically and missing components count as
/// zero. A pre-release suffix (`3.4.0-dev`) sorts before the bare release.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_release, a_suffix) = split_version(a);
    let (b_release, b_suffix) = split_version(b);

    let len = a_release.len().max(b_release.len());
    for i in 0..len {
        let x = a_release.get(i).copied().unwrap_or(0);
        let y = b_release.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    match (a_suffix, b_suffix) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

fn split_version(version: &str) -> (Vec<u64>, Option<&str>) {
    let version = version.trim();
    let (release, suffix) = match version.find(['-', '+']) {
        Some(idx) => (&version[..idx], Some(&version[idx + 1..])),
        None => (version, None),
    };

    let components = release
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect();

    (components, suffix)
}
