// ABOUTME: Configuration for the executor service, its thread pool and logging
// ABOUTME: Loads YAML from an explicit path or standard locations, then applies environment overrides

pub mod logging;

pub use logging::init_logging;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::registry::RegistryKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub registry: RegistryKind,

    /// Shut the backend down together with the service.
    #[serde(default)]
    pub shutdown_backend: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub thread_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            thread_name: "taskexe-worker".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

const CONFIG_FILE_NAMES: [&str; 4] = [
    "taskexe.yaml",
    "taskexe.yml",
    ".taskexe.yaml",
    ".taskexe.yml",
];

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path.or_else(Self::find_config_file) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Config::default(),
        };
        config.merge_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .or_else(|| {
                dirs::home_dir()
                    .map(|home| home.join(".taskexe").join("config.yaml"))
                    .filter(|path| path.exists())
            })
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        self.merge_from(|key| std::env::var(key).ok())
    }

    /// Applies `TASKEXE_*` overrides read through `lookup`.
    pub fn merge_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(registry) = lookup("TASKEXE_REGISTRY") {
            self.service.registry = registry.parse()?;
        }
        if let Some(flag) = lookup("TASKEXE_SHUTDOWN_BACKEND") {
            self.service.shutdown_backend = flag
                .parse()
                .with_context(|| format!("Invalid TASKEXE_SHUTDOWN_BACKEND: {}", flag))?;
        }

        if let Some(workers) = lookup("TASKEXE_WORKERS") {
            self.pool.workers = workers
                .parse()
                .with_context(|| format!("Invalid TASKEXE_WORKERS: {}", workers))?;
        }
        if let Some(name) = lookup("TASKEXE_THREAD_NAME") {
            self.pool.thread_name = name;
        }

        if let Some(level) = lookup("TASKEXE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TASKEXE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }
}
