// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `procherd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procherd",
    version,
    about = "Start, watch and shut down a fixed set of local services.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Procherd.toml")]
    pub config: String,

    /// Start only this service (repeatable). Starts every service if omitted.
    #[arg(long = "service", short = 's', value_name = "NAME")]
    pub services: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCHERD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the services, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_service_flags_are_collected() {
        let args = CliArgs::try_parse_from([
            "procherd",
            "--config",
            "demos/Procherd.toml",
            "-s",
            "Auth Service",
            "--service",
            "Order Service",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config, "demos/Procherd.toml");
        assert_eq!(args.services, vec!["Auth Service", "Order Service"]);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(!args.dry_run);
    }
}
