use std::fmt;

/// Lifecycle state of a supervised service.
///
/// Transitions for one service are strictly ordered:
/// `Starting -> (Online | Error)` and `Online -> Stopping -> Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Starting,
    Online,
    Stopping,
    Offline,
    Error,
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState::Offline
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Starting => "STARTING",
            ServiceState::Online => "ONLINE",
            ServiceState::Stopping => "STOPPING",
            ServiceState::Offline => "OFFLINE",
            ServiceState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Severity of a surfaced log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// Which output channel of the child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}
