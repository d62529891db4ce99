//! Signal delivery and reaping for the supervised engine process.
//!
//! Forceful termination sends SIGTERM, waits for the grace period, then
//! falls back to SIGKILL. Waits run on the tokio timer so the runtime keeps
//! serving other tasks while the engine shuts down.

use std::io;
use std::time::Duration;

use tokio::process::Child;

/// Send `signal` to `pid`.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    if pid == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "refusing to signal pid 0"));
    }

    // SAFETY: kill has no memory-safety preconditions.
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Wait for a child to exit, giving up after `timeout`.
///
/// Returns true if the child has exited (and has been reaped).
pub async fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            log::debug!("wait on engine {:?} failed: {}", child.id(), e);
            false
        }
        Err(_) => false,
    }
}

/// Terminate a child: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// A child that already exited is reaped and left alone.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    let Some(pid) = child.id() else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        match send_signal(pid, libc::SIGTERM) {
            Ok(()) => {
                if wait_for_exit(child, grace).await {
                    log::info!("Engine process {} terminated", pid);
                    return Ok(());
                }
                log::warn!("Engine {} did not respond to SIGTERM, sending SIGKILL", pid);
            }
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                child.wait().await?;
                return Ok(());
            }
            Err(e) => log::warn!("Failed to send SIGTERM to engine {}: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    kill_child(child)?;
    child.wait().await?;
    log::info!("Engine process {} killed", pid);
    Ok(())
}

/// Send SIGKILL without waiting. The runtime reaps the child once it exits.
pub fn kill_child(child: &mut Child) -> io::Result<()> {
    match child.start_kill() {
        Ok(()) => Ok(()),
        // Already exited and reaped.
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e),
    }
}
