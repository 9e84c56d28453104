//! Sensor-file fixtures.
//!
//! [`SensorFixture`] owns a temporary directory holding the temperature
//! and heater-state files. Nothing is written until the test asks, so a
//! fresh fixture models "sensor files not there yet".

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::TestConfigBuilder;

/// A temp directory with well-known sensor file paths.
///
/// The directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct SensorFixture {
    dir: TempDir,
    temperature: PathBuf,
    heater_state: PathBuf,
}

impl SensorFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let temperature = dir.path().join("temp");
        let heater_state = dir.path().join("status");
        Self {
            dir,
            temperature,
            heater_state,
        }
    }

    /// Fixture with both files populated.
    pub fn with_values(temperature: &str, heater_state: &str) -> Self {
        let fixture = Self::new();
        fixture.write_temperature(temperature);
        fixture.write_heater_state(heater_state);
        fixture
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn temperature_path(&self) -> &Path {
        &self.temperature
    }

    pub fn heater_state_path(&self) -> &Path {
        &self.heater_state
    }

    pub fn write_temperature(&self, contents: &str) {
        std::fs::write(&self.temperature, contents).expect("failed to write temperature file");
    }

    pub fn write_heater_state(&self, contents: &str) {
        std::fs::write(&self.heater_state, contents).expect("failed to write heater state file");
    }

    /// A config builder already pointed at this fixture's files.
    pub fn config_builder(&self) -> TestConfigBuilder {
        TestConfigBuilder::new().sensor_paths(&self.temperature, &self.heater_state)
    }
}

impl Default for SensorFixture {
    fn default() -> Self {
        Self::new()
    }
}
