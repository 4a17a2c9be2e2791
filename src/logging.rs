// src/logging.rs

//! Logging setup for `procherd` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `PROCHERD_LOG` environment variable: a bare level ("debug") or full
//!    `EnvFilter` directives ("procherd::supervisor=debug,info")
//! 3. default to `info`
//!
//! Every raw line read from a child is traced under [`CHILD_OUTPUT_TARGET`].
//! That target stays silent unless the level is `trace` or a directive names
//! it explicitly, so `debug` does not echo all service output twice.
//!
//! Diagnostics go to STDERR; STDOUT carries the service events printed by
//! the console.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Tracing target for raw child output lines.
pub const CHILD_OUTPUT_TARGET: &str = "procherd::child_output";

/// Dependencies of the graceful shutdown client that are noisy below `warn`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest"];

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directives_for(level_from_log_level(lvl))),
        None => filter_from_env(std::env::var("PROCHERD_LOG").ok().as_deref()),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn filter_from_env(value: Option<&str>) -> EnvFilter {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return EnvFilter::new(directives_for(Level::INFO));
    };

    if let Some(level) = parse_level_str(value) {
        return EnvFilter::new(directives_for(level));
    }

    EnvFilter::try_new(value).unwrap_or_else(|e| {
        eprintln!("procherd: ignoring invalid PROCHERD_LOG '{value}': {e}");
        EnvFilter::new(directives_for(Level::INFO))
    })
}

/// Filter directives for a plain level.
fn directives_for(level: Level) -> String {
    let level_str = level.as_str().to_lowercase();
    let mut directives = vec![level_str];

    // More verbose levels compare greater.
    if level > Level::WARN {
        directives.extend(QUIET_DEPENDENCIES.iter().map(|dep| format!("{dep}=warn")));
    }
    if level != Level::TRACE {
        directives.push(format!("{CHILD_OUTPUT_TARGET}=off"));
    }

    directives.join(",")
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
