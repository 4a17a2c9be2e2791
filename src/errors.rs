// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcherdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service already running: {0}")]
    AlreadyRunning(String),

    #[error("Failed to spawn service '{service}': {source}")]
    SpawnFailed {
        service: String,
        #[source]
        source: std::io::Error,
    },

    /// Graceful shutdown request failed. Expected during escalation and never
    /// returned from `Supervisor::stop`.
    #[error("Graceful shutdown unavailable on port {port}: {reason}")]
    GracefulShutdownUnavailable { port: u16, reason: String },

    #[error("Process for service '{service}' (pid {pid:?}) did not exit after forceful termination")]
    UnkillableProcess { service: String, pid: Option<u32> },

    #[error("Supervisor has been shut down")]
    SupervisorShutDown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcherdError>;
