//! Sensor file readers.
//!
//! The temperature and heater-state values are published by an external
//! process as small text files. Each read opens the file, parses it, and
//! closes it again; nothing is cached between cycles.
//!
//! Errors classify themselves as retryable or fatal. A file that is missing
//! or holds garbage may be mid-rewrite, so the sample loop skips the cycle
//! and tries again. A file that exists but cannot be opened (permissions,
//! wrong file type) will not fix itself.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use iotclient_config::SensorsConfig;
use tracing::debug;

use crate::BoxFuture;
use crate::reading::Reading;

/// Longest slice of malformed content kept in an error for logging.
const MAX_EXCERPT_CHARS: usize = 32;

/// Errors from reading a sensor file.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor file {} is not available", path.display())]
    Unavailable { path: PathBuf },

    #[error("sensor file {} holds malformed content {content:?}", path.display())]
    Malformed { path: PathBuf, content: String },

    #[error("failed to read sensor file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SensorError {
    /// Whether a later cycle might succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Malformed { .. })
    }

    /// The sensor file this error is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::Unavailable { path } | Self::Malformed { path, .. } | Self::Io { path, .. } => {
                path
            }
        }
    }

    fn malformed(path: &Path, contents: &str) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            content: contents.trim().chars().take(MAX_EXCERPT_CHARS).collect(),
        }
    }
}

/// Source of sensor values for the sample loop.
///
/// Implementations must be `Send + Sync` for use in the async daemon.
pub trait SensorReader: Send + Sync {
    /// Current temperature.
    fn read_temperature(&self) -> BoxFuture<'_, Result<f64, SensorError>>;

    /// Whether the heater is currently on.
    fn read_heater_state(&self) -> BoxFuture<'_, Result<bool, SensorError>>;

    /// Both values as one [`Reading`], temperature first.
    fn read(&self) -> BoxFuture<'_, Result<Reading, SensorError>> {
        Box::pin(async move {
            let temperature = self.read_temperature().await?;
            let heater_on = self.read_heater_state().await?;
            Ok(Reading::new(temperature, heater_on))
        })
    }
}

/// Parse temperature file contents: the first whitespace-delimited token as
/// a finite decimal number.
pub fn parse_temperature(contents: &str) -> Option<f64> {
    contents
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Parse heater-state file contents.
///
/// Only a first token of exactly `ON` means on. `OFF`, lowercase `on`,
/// longer tokens such as `ONE`, and an empty file all mean off.
pub fn parse_heater_state(contents: &str) -> bool {
    contents.split_whitespace().next() == Some("ON")
}

/// [`SensorReader`] backed by the two well-known files.
#[derive(Debug, Clone)]
pub struct FileSensors {
    temperature_path: PathBuf,
    heater_state_path: PathBuf,
}

impl FileSensors {
    pub fn new(temperature_path: impl Into<PathBuf>, heater_state_path: impl Into<PathBuf>) -> Self {
        Self {
            temperature_path: temperature_path.into(),
            heater_state_path: heater_state_path.into(),
        }
    }

    pub fn from_config(config: &SensorsConfig) -> Self {
        Self::new(&config.temperature_path, &config.heater_state_path)
    }

    pub fn temperature_path(&self) -> &Path {
        &self.temperature_path
    }

    pub fn heater_state_path(&self) -> &Path {
        &self.heater_state_path
    }
}

impl SensorReader for FileSensors {
    fn read_temperature(&self) -> BoxFuture<'_, Result<f64, SensorError>> {
        Box::pin(async move {
            let path = &self.temperature_path;
            let contents = read_sensor_file(path).await?;
            let temperature =
                parse_temperature(&contents).ok_or_else(|| SensorError::malformed(path, &contents))?;
            debug!(path = %path.display(), temperature, "read temperature");
            Ok(temperature)
        })
    }

    fn read_heater_state(&self) -> BoxFuture<'_, Result<bool, SensorError>> {
        Box::pin(async move {
            let path = &self.heater_state_path;
            let contents = read_sensor_file(path).await?;
            let heater_on = parse_heater_state(&contents);
            debug!(path = %path.display(), heater_on, "read heater state");
            Ok(heater_on)
        })
    }
}

async fn read_sensor_file(path: &Path) -> Result<String, SensorError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(SensorError::Unavailable {
            path: path.to_path_buf(),
        }),
        // Not UTF-8.
        Err(e) if e.kind() == ErrorKind::InvalidData => Err(SensorError::Malformed {
            path: path.to_path_buf(),
            content: "<binary data>".to_string(),
        }),
        Err(source) => Err(SensorError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
