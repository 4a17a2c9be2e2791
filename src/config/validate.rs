// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    announce_pattern, ConfigFile, RawConfigFile, ServiceConfig, SupervisorSection, SupervisorSettings,
};
use crate::errors::{ProcherdError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcherdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_services(&raw)?;
        let settings = validate_supervisor_section(&raw.supervisor)?;
        let mut services = raw.service;
        validate_services(&mut services)?;
        Ok(ConfigFile::new_unchecked(settings, services))
    }
}

fn ensure_has_services(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.is_empty() {
        return Err(ProcherdError::ConfigError(
            "config must contain at least one [[service]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_supervisor_section(section: &SupervisorSection) -> Result<SupervisorSettings> {
    if section.log_sentinel.trim().is_empty() {
        return Err(ProcherdError::ConfigError(
            "[supervisor].log_sentinel must not be empty".to_string(),
        ));
    }

    if section.event_buffer == 0 {
        return Err(ProcherdError::ConfigError(
            "[supervisor].event_buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.failure_words.iter().any(|w| w.trim().is_empty()) {
        return Err(ProcherdError::ConfigError(
            "[supervisor].failure_words must not contain empty entries".to_string(),
        ));
    }

    Ok(SupervisorSettings {
        graceful_timeout: duration_field("graceful_timeout", &section.graceful_timeout)?,
        settle_period: duration_field("settle_period", &section.settle_period)?,
        kill_timeout: duration_field("kill_timeout", &section.kill_timeout)?,
        reader_quiesce_timeout: duration_field(
            "reader_quiesce_timeout",
            &section.reader_quiesce_timeout,
        )?,
        launch_interval: duration_field("launch_interval", &section.launch_interval)?,
        log_sentinel: section.log_sentinel.trim().to_string(),
        failure_words: section
            .failure_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .collect(),
        event_buffer: section.event_buffer,
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| {
        ProcherdError::ConfigError(format!("[supervisor].{field} = \"{value}\": {e}"))
    })
}

/// Names are stored trimmed, so config lookups and the registry agree.
fn validate_services(services: &mut [ServiceConfig]) -> Result<()> {
    let mut seen = HashSet::new();

    for service in services.iter_mut() {
        service.name = service.name.trim().to_string();
        let name = service.name.as_str();
        if name.is_empty() {
            return Err(ProcherdError::ConfigError(
                "service name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name.to_string()) {
            return Err(ProcherdError::ConfigError(format!(
                "duplicate service name '{}'",
                name
            )));
        }

        let argv = service.cmd.argv();
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(ProcherdError::ConfigError(format!(
                "service '{}' has an empty `cmd`",
                name
            )));
        }

        if service.control_port == Some(0) {
            return Err(ProcherdError::ConfigError(format!(
                "service '{}' has control_port = 0",
                name
            )));
        }

        for pattern in service.announce.iter() {
            if let Err(e) = announce_pattern(pattern) {
                return Err(ProcherdError::ConfigError(format!(
                    "service '{}' has invalid announce pattern '{}': {}",
                    name, pattern, e
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn defaults_apply_when_supervisor_section_is_missing() {
        let cfg = parse(
            r#"
            [[service]]
            name = "Auth Service"
            cmd = "node -u auth-service.js"
            control_port = 3001
            "#,
        )
        .expect("valid config");

        assert_eq!(cfg.supervisor, SupervisorSettings::default());
        assert_eq!(cfg.service.len(), 1);
        assert_eq!(cfg.service[0].control_port, Some(3001));
    }

    #[test]
    fn rejects_empty_service_list() {
        let err = parse("[supervisor]\nsettle_period = \"1s\"\n").unwrap_err();
        assert!(matches!(err, ProcherdError::ConfigError(_)));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = parse(
            r#"
            [[service]]
            name = "A"
            cmd = "true"

            [[service]]
            name = "A"
            cmd = "false"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate service name 'A'"));
    }

    #[test]
    fn rejects_empty_command_and_zero_port() {
        let err = parse("[[service]]\nname = \"A\"\ncmd = \"   \"\n").unwrap_err();
        assert!(err.to_string().contains("empty `cmd`"));

        let err = parse("[[service]]\nname = \"A\"\ncmd = []\n").unwrap_err();
        assert!(err.to_string().contains("empty `cmd`"));

        let err = parse("[[service]]\nname = \"A\"\ncmd = \"x\"\ncontrol_port = 0\n").unwrap_err();
        assert!(err.to_string().contains("control_port = 0"));
    }

    #[test]
    fn rejects_bad_durations_and_patterns() {
        let err = parse(
            "[supervisor]\nkill_timeout = \"soon\"\n[[service]]\nname = \"A\"\ncmd = \"x\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("kill_timeout"));

        let err =
            parse("[[service]]\nname = \"A\"\ncmd = \"x\"\nannounce = [\"re:(\"]\n").unwrap_err();
        assert!(err.to_string().contains("invalid announce pattern"));

        // Without the prefix the same text is a literal substring.
        assert!(parse("[[service]]\nname = \"A\"\ncmd = \"x\"\nannounce = [\"(\"]\n").is_ok());
    }

    #[test]
    fn service_names_are_stored_trimmed() {
        let cfg = parse(
            r#"
            [[service]]
            name = "  Auth  "
            cmd = "node -u auth-service.js"
            "#,
        )
        .expect("valid config");

        assert_eq!(cfg.service[0].name, "Auth");
        assert!(cfg.service("Auth").is_some());
        assert!(cfg.service("  Auth  ").is_none());
    }

    #[test]
    fn names_equal_after_trimming_are_duplicates() {
        let err = parse("[[service]]\nname = \"A\"\ncmd = \"x\"\n[[service]]\nname = \" A\"\ncmd = \"y\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate service name 'A'"));
    }

    #[test]
    fn failure_words_are_normalised() {
        let cfg = parse(
            "[supervisor]\nfailure_words = [\" Panic \", \"ERROR\"]\n[[service]]\nname = \"A\"\ncmd = \"x\"\n",
        )
        .expect("valid config");
        assert_eq!(cfg.supervisor.failure_words, vec!["panic", "error"]);
    }
}
