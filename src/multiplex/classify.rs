// src/multiplex/classify.rs

//! Turning raw output lines into [`LogEvent`]s.
//!
//! A line starting with the configured sentinel (default `LOG::`) carries a
//! JSON object payload:
//!
//! ```text
//! LOG::{"service":"Auth Service","message":"ready","level":"info"}
//! ```
//!
//! `message` is required; `service` falls back to the supervising service's
//! name and `level` (or `severity`) is an optional hint. Any other line is
//! surfaced only when it matches one of the service's `announce` patterns.

use regex::Regex;
use serde::Deserialize;

use crate::config::SupervisorSettings;
use crate::events::LogEvent;
use crate::registry::ServiceDescriptor;
use crate::types::{OutputStream, Severity};

/// Level hints that force ERROR severity regardless of the message text.
const ERROR_LEVELS: &[&str] = &["error", "err", "fatal", "critical"];

#[derive(Debug, Deserialize)]
struct StructuredRecord {
    #[serde(default)]
    service: Option<String>,
    message: String,
    #[serde(default, alias = "severity")]
    level: Option<String>,
}

/// Per-service line classifier shared by that service's reader loops.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    service: String,
    sentinel: String,
    failure_words: Vec<String>,
    announce: Vec<Regex>,
}

impl LineClassifier {
    pub fn new(descriptor: &ServiceDescriptor, settings: &SupervisorSettings) -> Self {
        Self {
            service: descriptor.name.clone(),
            sentinel: settings.log_sentinel.clone(),
            failure_words: settings
                .failure_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            announce: descriptor.announce.clone(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Classify one line of output. `None` means the line is dropped.
    pub fn classify(&self, line: &str, source: OutputStream) -> Option<LogEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match line.strip_prefix(self.sentinel.as_str()) {
            Some(payload) => self.classify_structured(payload, source),
            None => self.classify_plain(line, source),
        }
    }

    fn classify_structured(&self, payload: &str, source: OutputStream) -> Option<LogEvent> {
        // Child output is untrusted; unparsable payloads are dropped.
        let record: StructuredRecord = serde_json::from_str(payload.trim()).ok()?;

        let severity = self.severity_of(&record.message, record.level.as_deref());
        let service = record
            .service
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.service.clone());

        Some(LogEvent {
            service,
            message: record.message,
            severity,
            source,
        })
    }

    fn classify_plain(&self, line: &str, source: OutputStream) -> Option<LogEvent> {
        if !self.announce.iter().any(|re| re.is_match(line)) {
            return None;
        }

        Some(LogEvent {
            service: self.service.clone(),
            message: line.to_string(),
            severity: Severity::Info,
            source,
        })
    }

    fn severity_of(&self, message: &str, level: Option<&str>) -> Severity {
        let level_is_error = level
            .map(|l| l.trim().to_lowercase())
            .is_some_and(|l| ERROR_LEVELS.contains(&l.as_str()));

        let lowered = message.to_lowercase();
        let message_is_error = self
            .failure_words
            .iter()
            .any(|word| lowered.contains(word.as_str()));

        if level_is_error || message_is_error {
            Severity::Error
        } else {
            Severity::Info
        }
    }
}
