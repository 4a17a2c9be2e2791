#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use procherd::config::{
    CommandSpec, ConfigFile, RawConfigFile, ServiceConfig, SupervisorSection, SupervisorSettings,
};
use procherd::events::event_channel;
use procherd::registry::{ServiceDescriptor, ServiceRegistry};
use procherd::supervisor::{GracefulShutdown, Supervisor};

use crate::events::{collect_events, EventLog};

/// Settings with short timeouts so escalation tests finish quickly.
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        graceful_timeout: Duration::from_millis(500),
        settle_period: Duration::from_millis(300),
        kill_timeout: Duration::from_secs(2),
        reader_quiesce_timeout: Duration::from_secs(1),
        launch_interval: Duration::from_millis(0),
        ..SupervisorSettings::default()
    }
}

/// A service running `sh -c <script>`.
pub fn sh_service(name: &str, script: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name, ["sh", "-c", script])
}

/// Build a supervisor over `services` whose events are collected into an
/// [`EventLog`].
pub fn supervisor_with(
    services: Vec<ServiceDescriptor>,
    settings: SupervisorSettings,
    graceful: Arc<dyn GracefulShutdown>,
) -> (Supervisor, EventLog) {
    let registry = Arc::new(ServiceRegistry::new(services).expect("valid registry"));
    let (tx, rx) = event_channel(settings.event_buffer);
    let supervisor = Supervisor::with_graceful(registry, settings, tx, graceful);
    (supervisor, collect_events(rx))
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                supervisor: SupervisorSection::default(),
                service: Vec::new(),
            },
        }
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.config.service.push(service);
        self
    }

    pub fn with_sentinel(mut self, sentinel: &str) -> Self {
        self.config.supervisor.log_sentinel = sentinel.to_string();
        self
    }

    pub fn with_settle_period(mut self, duration: &str) -> Self {
        self.config.supervisor.settle_period = duration.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ServiceConfig`.
pub struct ServiceConfigBuilder {
    service: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            service: ServiceConfig {
                name: name.to_string(),
                cmd: CommandSpec::Line(cmd.to_string()),
                control_port: None,
                announce: vec![],
                cwd: None,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn argv(mut self, argv: &[&str]) -> Self {
        self.service.cmd = CommandSpec::Argv(argv.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn control_port(mut self, port: u16) -> Self {
        self.service.control_port = Some(port);
        self
    }

    pub fn announce(mut self, pattern: &str) -> Self {
        self.service.announce.push(pattern.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.service.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.service
    }
}
