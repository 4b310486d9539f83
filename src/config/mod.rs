//! Configuration management for the status stream server.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base (reproducing the reference deployment)
//! - Optional configuration files
//! - Environment variable overrides
//! - Component-wise validation
mod monitoring;
mod server;
mod services;
mod stream;
pub use monitoring::*;
pub use server::*;
pub use services::*;
pub use stream::*;
use services::default_services;

use std::collections::HashSet;
use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Error;
use crate::Result;
use crate::ServiceId;

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. `config/status-stream` file (optional)
/// 3. Configuration file specified by `CONFIG_PATH`
/// 4. `config/local` file (optional, not checked in)
/// 5. Environment variables with `STREAM__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    /// HTTP listener and process-level settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-session polling and tailing parameters
    #[serde(default)]
    pub stream: SessionConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Monitored services with their log file and probe
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            stream: SessionConfig::default(),
            monitoring: MonitoringConfig::default(),
            services: default_services(),
        }
    }
}

impl StreamConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so callers can apply further overrides via
    /// `with_override_config()`. Call `validate()` before use.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/status-stream").required(false));

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.stream.validate()?;
        self.monitoring.validate()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.service) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "service {} is configured more than once",
                    service.service
                ))));
            }
            service.validate()?;
        }
        Ok(self)
    }

    /// Configured service set, in configuration order
    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.services.iter().map(|s| s.service).collect()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
