//! Runtime configuration.
//!
//! Loaded from a YAML file with every field defaulted, so an empty (or
//! absent) file yields a working development setup.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub email: EmailConfig,
    pub scripts: ScriptConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check values that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.scheduler.max_tasks_per_poll == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_tasks_per_poll must be positive".to_string(),
            ));
        }
        if self.scheduler.watchdog_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.watchdog_interval_secs must be positive".to_string(),
            ));
        }
        if self.email.enabled && self.email.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "email.endpoint is required when email.enabled is true".to_string(),
            ));
        }
        Ok(())
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tempo.db"),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8530,
        }
    }
}

impl ServerConfig {
    /// Get the socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!("invalid bind address: {}:{}", self.host, self.port))
            })
    }
}

/// Scheduler timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-task polls.
    pub poll_interval_secs: u64,
    /// Seconds to wait before the first poll after startup, so a fleet of
    /// restarting services does not stampede the store at once.
    pub startup_offset_secs: u64,
    /// Cap on tasks dispatched per poll cycle.
    pub max_tasks_per_poll: usize,
    /// Seconds between watchdog checks.
    pub watchdog_interval_secs: u64,
    /// Seconds after which a running task counts as stuck.
    pub stuck_threshold_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            startup_offset_secs: 5,
            max_tasks_per_poll: 10,
            watchdog_interval_secs: 300,
            stuck_threshold_secs: 3600,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Startup offset as a Duration.
    pub fn startup_offset(&self) -> Duration {
        Duration::from_secs(self.startup_offset_secs)
    }

    /// Watchdog interval as a Duration.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// Stuck-task threshold as a Duration.
    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }
}

/// Email gate and provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Administrative gate: when false, email tasks fail fast.
    pub enabled: bool,
    /// HTTP mail-provider endpoint.
    pub endpoint: Option<String>,
    /// Default From address.
    pub from: Option<String>,
    /// Provider name reported in execution results.
    pub provider: Option<String>,
}

/// Script handler settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Directory where handler names resolve to executables.
    pub command_root: Option<PathBuf>,
}
