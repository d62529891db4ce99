//! Default values for launching and supervising the engine.

use std::time::Duration;

pub const BINARY: &str = "hhvm";
pub const CHECK_SCRIPT: &str = "hhvm_config_check.php";

pub const FASTCGI_PORT: u16 = 8092;
pub const ADMIN_PORT: u16 = 8093;

pub const HEALTH_PATH: &str = "/check-health";
pub const STOP_PATH: &str = "/stop";
pub const FAILURE_SENTINEL: &str = "failure";
pub const READINESS_FIELD: &str = "tc-size";

pub const HEALTH_CHECK_ATTEMPTS: u32 = 10;

pub const VERSION_CHECK: &str = "HHVM_VERSION";
pub const MIN_SUPPORTED_VERSION: &str = "3.4.0";

pub const DELAY_PROCESS_LAUNCH_SECS: u64 = 0;
pub const DELAY_CHECK_HEALTH_SECS: u64 = 1;
pub const ADMIN_REQUEST_TIMEOUT_SECS: u64 = 3;
pub const GRACEFUL_STOP_TIMEOUT_SECS: u64 = 5;
pub const TERMINATE_GRACE_SECS: u64 = 5;
pub const VERSION_WARNING_PAUSE_SECS: u64 = 2;

pub fn delay_process_launch() -> Duration { Duration::from_secs(DELAY_PROCESS_LAUNCH_SECS) }
pub fn delay_check_health() -> Duration { Duration::from_secs(DELAY_CHECK_HEALTH_SECS) }
pub fn admin_request_timeout() -> Duration { Duration::from_secs(ADMIN_REQUEST_TIMEOUT_SECS) }
pub fn graceful_stop_timeout() -> Duration { Duration::from_secs(GRACEFUL_STOP_TIMEOUT_SECS) }
pub fn terminate_grace() -> Duration { Duration::from_secs(TERMINATE_GRACE_SECS) }
pub fn version_warning_pause() -> Duration { Duration::from_secs(VERSION_WARNING_PAUSE_SECS) }
