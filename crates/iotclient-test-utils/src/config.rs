//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries. The builder starts from
//! defaults with syslog switched off, so tests never write to `/dev/log`.

use std::path::{Path, PathBuf};

use iotclient_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .endpoint_url(&collector.url())
///     .poll_interval_secs(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.logging.syslog = false;
        Self { config }
    }

    pub fn endpoint_url(mut self, url: &str) -> Self {
        self.config.endpoint.url = url.to_string();
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.endpoint.poll_interval_secs = secs;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.endpoint.timeout_secs = secs;
        self
    }

    pub fn sensor_paths(mut self, temperature: &Path, heater_state: &Path) -> Self {
        self.config.sensors.temperature_path = temperature.to_path_buf();
        self.config.sensors.heater_state_path = heater_state.to_path_buf();
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.config.sensors.max_consecutive_failures = n;
        self
    }

    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.daemon.pid_file = path.into();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Serialize the config as TOML into `path` and return it.
    pub fn write_to(self, path: &Path) -> AppConfig {
        let text = toml::to_string_pretty(&self.config).expect("failed to serialize test config");
        std::fs::write(path, text).expect("failed to write test config");
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
