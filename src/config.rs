//! Manager configuration.
//!
//! Two layers:
//! - [`ManagerConfig`]: what a [`ModuleManager`](crate::ModuleManager) is
//!   built from (name, logger factory, environment). Built in code:
//!
//!   ```rust
//!   use stagehand::{Environment, ManagerConfig};
//!
//!   let config = ManagerConfig::new()
//!       .with_name("billing")
//!       .with_env([("DATABASE_URL", "postgres://localhost/billing")].into_iter().collect::<Environment>());
//!   # let _ = config;
//!   ```
//!
//! - [`Settings`]: an optional YAML file for binaries, carrying the manager
//!   name, logging setup and environment overrides.
//!
//!   ```yaml
//!   name: billing
//!   logging:
//!     level: debug
//!     format: json
//!   env:
//!     POOL_SIZE: 8
//!     REGION: eu-west-1
//!   ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context as _};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use stagehand_common::{Error, Result};

use crate::env::{EnvValue, Environment};
use crate::logging::{tracing_logger_factory, LoggerFactory};

/// Name used when none is configured.
pub const DEFAULT_MANAGER_NAME: &str = "stagehand";

/// Configuration of a [`ModuleManager`](crate::ModuleManager).
#[derive(Clone)]
pub struct ManagerConfig {
    /// Name used in the manager's own diagnostics.
    pub name: String,

    /// Produces the manager's logger and one logger per module.
    pub logger_factory: LoggerFactory,

    /// Variables modules read; defaults are written into it during `init`.
    pub env: Environment,
}

impl ManagerConfig {
    /// Default configuration: tracing logger, process environment.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_MANAGER_NAME.to_string(),
            logger_factory: tracing_logger_factory(),
            env: Environment::from_process(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_logger_factory(mut self, logger_factory: LoggerFactory) -> Self {
        self.logger_factory = logger_factory;
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("name", &self.name)
            .field("env", &self.env.len())
            .finish_non_exhaustive()
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings file for binaries embedding a manager.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Variables overlaid on the base environment. Values must be strings or
    /// numbers.
    #[serde(default)]
    pub env: BTreeMap<String, YamlValue>,
}

impl Settings {
    /// Loads and validates a YAML settings file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))
            .map_err(|e| Error::config(format!("{:#}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// Parses and validates YAML settings.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)
            .context("Failed to parse settings")
            .map_err(|e| Error::config(format!("{:#}", e)))?;
        settings
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(anyhow!("Manager name cannot be empty"));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow!(
                    "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ))
            }
        }

        for (key, value) in &self.env {
            if key.is_empty() {
                return Err(anyhow!("Environment variable name cannot be empty"));
            }
            if !matches!(value, YamlValue::String(_) | YamlValue::Number(_)) {
                return Err(anyhow!(
                    "Environment variable {} must be a string or a number",
                    key
                ));
            }
        }

        Ok(())
    }

    /// Environment overrides as typed values.
    pub fn env_overrides(&self) -> Environment {
        self.env
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    YamlValue::String(s) => EnvValue::String(s.clone()),
                    YamlValue::Number(n) => EnvValue::Number(n.clone()),
                    _ => return None,
                };
                Some((key.clone(), value))
            })
            .collect()
    }

    /// Builds a manager configuration: `base_env` with the overrides on top,
    /// the configured name, and the tracing logger factory.
    pub fn into_manager_config(self, mut base_env: Environment) -> ManagerConfig {
        base_env.overlay(self.env_overrides());
        let config = ManagerConfig::new().with_env(base_env);
        match self.name {
            Some(name) => config.with_name(name),
            None => config,
        }
    }
}
