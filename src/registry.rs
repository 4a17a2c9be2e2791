// src/registry.rs

//! Immutable table of service descriptors.
//!
//! The registry is built once from configuration and never mutated. It is
//! shared (`Arc`) between the supervisor and its reader loops.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::config::{announce_pattern, ConfigFile, ServiceConfig};
use crate::errors::{ProcherdError, Result};

/// Static description of one service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub control_port: Option<u16>,
    /// Allow-list for non-structured output lines.
    pub announce: Vec<Regex>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            control_port: None,
            announce: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = Some(port);
        self
    }

    pub fn with_announce(mut self, pattern: Regex) -> Self {
        self.announce.push(pattern);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let announce = cfg
            .announce
            .iter()
            .map(|p| {
                announce_pattern(p).map_err(|e| {
                    ProcherdError::ConfigError(format!(
                        "service '{}' has invalid announce pattern '{}': {}",
                        cfg.name, p, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: cfg.name.clone(),
            command: cfg.cmd.argv(),
            control_port: cfg.control_port,
            announce,
            cwd: cfg.cwd.clone(),
            env: cfg.env.clone(),
        })
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Ordered, read-only lookup table of services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<ServiceDescriptor>>,
    index: HashMap<String, usize>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Result<Self> {
        let mut services = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                return Err(ProcherdError::ConfigError(format!(
                    "duplicate service name '{}'",
                    descriptor.name
                )));
            }
            index.insert(descriptor.name.clone(), services.len());
            services.push(Arc::new(descriptor));
        }

        Ok(Self { services, index })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let descriptors = cfg
            .service
            .iter()
            .map(ServiceDescriptor::from_config)
            .collect::<Result<Vec<_>>>()?;
        Self::new(descriptors)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.index.get(name).map(|&i| &self.services[i])
    }

    /// Services in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceDescriptor>> {
        self.services.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
