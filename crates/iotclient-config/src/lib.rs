#![deny(unsafe_code)]

//! Configuration loading and validation for the iotclient daemon.
//!
//! Loads TOML configuration files and validates them. Provides the
//! [`AppConfig`] type as the central configuration structure. Every field
//! has a default, so an empty file (or no file at all) yields a working
//! configuration pointed at the stock sensor paths and collector URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Collector endpoint and polling cadence.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Sensor file locations and failure tolerance.
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Process-level daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where readings are sent and how often.
///
/// Fixed for the lifetime of the process: a reload request does not
/// re-read this section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Collector URL that receives the form-encoded POST.
    #[serde(default = "default_endpoint_url")]
    pub url: String,

    /// Seconds to sleep between sample cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single HTTP request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EndpointConfig {
    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint_url() -> String {
    "https://34.204.54.137:5000/data".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    5
}

/// Sensor file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsConfig {
    /// File holding the current temperature as a decimal number.
    #[serde(default = "default_temperature_path")]
    pub temperature_path: PathBuf,

    /// File holding the heater state token (`ON` or anything else).
    #[serde(default = "default_heater_state_path")]
    pub heater_state_path: PathBuf,

    /// Consecutive failed cycles tolerated before a sensor error becomes
    /// fatal. Zero makes the first failure fatal.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            temperature_path: default_temperature_path(),
            heater_state_path: default_heater_state_path(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

fn default_temperature_path() -> PathBuf {
    PathBuf::from("/tmp/temp")
}

fn default_heater_state_path() -> PathBuf {
    PathBuf::from("/tmp/status")
}

fn default_max_consecutive_failures() -> u32 {
    3
}

/// Process-level daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Identity tag used for every syslog entry.
    #[serde(default = "default_ident")]
    pub ident: String,

    /// Where the worker records its pid for `stop` and `status`.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ident: default_ident(),
            pid_file: default_pid_file(),
        }
    }
}

fn default_ident() -> String {
    "iotclientd".to_string()
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/iotclientd.pid")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Forward log events to the system logger.
    #[serde(default = "default_syslog")]
    pub syslog: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            syslog: default_syslog(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_syslog() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Blocking I/O: configuration is read before the process forks, when
    /// no async runtime exists yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// The collector URL, parsed.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint.url).map_err(|e| {
            ConfigError::Validation(format!(
                "endpoint.url {:?} is not a valid URL: {e}",
                self.endpoint.url
            ))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.endpoint_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "endpoint.url must use http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::Validation(
                "endpoint.url must include a host".to_string(),
            ));
        }
        if self.endpoint.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "endpoint.poll_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.endpoint.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "endpoint.timeout_secs must be non-zero".to_string(),
            ));
        }

        if self.sensors.temperature_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "sensors.temperature_path must not be empty".to_string(),
            ));
        }
        if self.sensors.heater_state_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "sensors.heater_state_path must not be empty".to_string(),
            ));
        }

        if self.daemon.ident.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.ident must not be empty".to_string(),
            ));
        }
        // The daemon chdirs to `/` after detaching.
        if !self.daemon.pid_file.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "daemon.pid_file must be an absolute path, got {}",
                self.daemon.pid_file.display()
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    /// Check that sensor paths survive the daemon's chdir to `/`.
    ///
    /// Relative paths are accepted by [`validate`](Self::validate) for
    /// foreground use; detaching requires absolute ones.
    pub fn validate_for_detach(&self) -> Result<(), ConfigError> {
        for (key, path) in [
            ("sensors.temperature_path", &self.sensors.temperature_path),
            ("sensors.heater_state_path", &self.sensors.heater_state_path),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "{key} must be an absolute path when detaching, got {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
