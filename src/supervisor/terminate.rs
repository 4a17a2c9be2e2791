// src/supervisor/terminate.rs

//! Forceful termination of a child and everything it spawned.
//!
//! - unix: children are started as leaders of their own process group, so a
//!   `SIGKILL` to the negative pid reaches the whole tree.
//! - windows: `taskkill /F /T /PID <pid>`.
//!
//! Both fall back to killing just the direct child.

use std::io;

use tokio::process::Child;
use tracing::debug;

pub fn terminate_tree(child: &mut Child) -> io::Result<()> {
    if let Some(pid) = child.id() {
        match kill_process_tree(pid) {
            Ok(()) => return Ok(()),
            Err(e) => debug!(pid, error = %e, "process tree kill failed; killing direct child"),
        }
    }
    child.start_kill()
}

#[cfg(unix)]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_process_tree(pid: u32) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill exited with {status}")))
    }
}
