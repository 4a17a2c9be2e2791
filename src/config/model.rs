// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [supervisor]
/// graceful_timeout = "2s"
/// settle_period = "1s"
///
/// [[service]]
/// name = "Auth Service"
/// cmd = "node -u auth-service.js"
/// control_port = 3001
///
/// [[service]]
/// name = "Frontend Server"
/// cmd = ["npx", "serve", "-l", "3000"]
/// announce = ["Accepting connections", "GET", "serving"]
/// ```
///
/// Use [`ConfigFile::try_from`] (or `config::load_and_validate`) to obtain a
/// validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Timeouts and log-protocol settings from `[supervisor]`.
    #[serde(default)]
    pub supervisor: SupervisorSection,

    /// Services from `[[service]]`, in declaration order.
    #[serde(default)]
    pub service: Vec<ServiceConfig>,
}

/// `[supervisor]` section, as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout: String,

    #[serde(default = "default_settle_period")]
    pub settle_period: String,

    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: String,

    #[serde(default = "default_reader_quiesce_timeout")]
    pub reader_quiesce_timeout: String,

    /// Pause between consecutive launches in `start_all`.
    #[serde(default = "default_launch_interval")]
    pub launch_interval: String,

    /// Prefix marking a structured log line.
    #[serde(default = "default_log_sentinel")]
    pub log_sentinel: String,

    /// Case-insensitive substrings that classify a structured message as ERROR.
    #[serde(default = "default_failure_words")]
    pub failure_words: Vec<String>,

    /// Capacity of the supervisor event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_graceful_timeout() -> String {
    "2s".to_string()
}

fn default_settle_period() -> String {
    "1s".to_string()
}

fn default_kill_timeout() -> String {
    "2s".to_string()
}

fn default_reader_quiesce_timeout() -> String {
    "1s".to_string()
}

fn default_launch_interval() -> String {
    "1500ms".to_string()
}

fn default_log_sentinel() -> String {
    "LOG::".to_string()
}

fn default_failure_words() -> Vec<String> {
    vec!["error".to_string(), "fail".to_string()]
}

fn default_event_buffer() -> usize {
    256
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            graceful_timeout: default_graceful_timeout(),
            settle_period: default_settle_period(),
            kill_timeout: default_kill_timeout(),
            reader_quiesce_timeout: default_reader_quiesce_timeout(),
            launch_interval: default_launch_interval(),
            log_sentinel: default_log_sentinel(),
            failure_words: default_failure_words(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// `[[service]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Unique service name, used as the registry key.
    pub name: String,

    /// Launch command.
    pub cmd: CommandSpec,

    /// Port accepting `POST /shutdown` for graceful termination.
    #[serde(default)]
    pub control_port: Option<u16>,

    /// Allow-list for non-structured output lines; a matching line is
    /// surfaced as an INFO event. Entries are literal substrings unless
    /// prefixed with `re:`, see [`announce_pattern`].
    #[serde(default)]
    pub announce: Vec<String>,

    /// Working directory, relative to the config file's directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Prefix marking an `announce` entry as a regular expression.
pub const ANNOUNCE_REGEX_PREFIX: &str = "re:";

/// Compile one `announce` entry.
///
/// `"serving (http)"` matches that exact text anywhere in a line;
/// `"re:^GET /"` is used as a regular expression.
pub fn announce_pattern(entry: &str) -> std::result::Result<Regex, regex::Error> {
    match entry.strip_prefix(ANNOUNCE_REGEX_PREFIX) {
        Some(pattern) => Regex::new(pattern),
        None => Regex::new(&regex::escape(entry)),
    }
}

/// A command given either as a single whitespace-separated line or as an
/// explicit argv array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Split into program + arguments.
    pub fn argv(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandSpec::Argv(argv) => argv.clone(),
        }
    }

    /// Human readable form, used in logs and dry-run output.
    pub fn display(&self) -> String {
        match self {
            CommandSpec::Line(line) => line.trim().to_string(),
            CommandSpec::Argv(argv) => argv.join(" "),
        }
    }
}

/// Parsed `[supervisor]` settings with concrete durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub graceful_timeout: Duration,
    pub settle_period: Duration,
    pub kill_timeout: Duration,
    pub reader_quiesce_timeout: Duration,
    pub launch_interval: Duration,
    pub log_sentinel: String,
    pub failure_words: Vec<String>,
    pub event_buffer: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(2),
            settle_period: Duration::from_secs(1),
            kill_timeout: Duration::from_secs(2),
            reader_quiesce_timeout: Duration::from_secs(1),
            launch_interval: Duration::from_millis(1500),
            log_sentinel: default_log_sentinel(),
            failure_words: default_failure_words(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so every service name is
/// unique, every command is non-empty and every duration parsed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSettings,
    pub service: Vec<ServiceConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(supervisor: SupervisorSettings, service: Vec<ServiceConfig>) -> Self {
        Self { supervisor, service }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.service.iter().find(|s| s.name == name)
    }
}
