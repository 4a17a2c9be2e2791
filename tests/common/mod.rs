#![allow(dead_code)]

pub use procherd_test_utils::builders::{fast_settings, sh_service, supervisor_with};
pub use procherd_test_utils::events::EventLog;
pub use procherd_test_utils::fake_shutdown::RecordingShutdown;
pub use procherd_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

/// Shell snippet printing one structured log line.
pub fn log_line(service: &str, message: &str) -> String {
    format!(r#"echo 'LOG::{{"service":"{service}","message":"{message}"}}'"#)
}

/// True while a process with `pid` exists and is not a zombie.
pub fn process_alive(pid: u32) -> bool {
    let proc_dir = std::path::Path::new("/proc");
    if proc_dir.is_dir() {
        return match std::fs::read_to_string(proc_dir.join(pid.to_string()).join("stat")) {
            // The state is the first field after the parenthesised command name.
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        };
    }

    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Poll until `pid` is gone.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_alive(pid)
}
