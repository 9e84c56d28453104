//! Sample loop and daemon lifecycle.
//!
//! Each cycle reads the sensors, hands the reading to the reporter, then
//! sleeps for the poll interval. Cycles never overlap, and a stop request
//! is only honoured between cycles.

use std::time::Duration;

use iotclient_config::AppConfig;
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::reporter::{HttpReporter, ReportError, Reporter};
use crate::sensor::{FileSensors, SensorError, SensorReader};
use crate::signals::SignalController;

/// Counters accumulated over the life of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Cycles started.
    pub cycles: u64,
    /// Readings the collector answered, whatever the status.
    pub sent: u64,
    /// Sent readings answered with a non-2xx status.
    pub rejected: u64,
    /// Readings that never reached the collector.
    pub send_failures: u64,
    /// Cycles skipped because a sensor could not be read.
    pub sensor_failures: u64,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent(StatusCode),
    SendFailed,
    SensorSkipped,
}

/// Errors that end the sample loop.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("sensor failure: {0}")]
    Sensor(#[from] SensorError),

    #[error("failed to set up reporter: {0}")]
    Reporter(#[from] ReportError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

/// The iotclient daemon: sensors, reporter, and the run/stop flag.
pub struct Daemon {
    sensors: Box<dyn SensorReader>,
    reporter: Box<dyn Reporter>,
    signals: SignalController,
    poll_interval: Duration,
    max_consecutive_failures: u32,
}

impl Daemon {
    /// Create a daemon reading the configured files and posting to the
    /// configured endpoint.
    pub fn new(config: &AppConfig) -> Result<Self, DaemonError> {
        let sensors = FileSensors::from_config(&config.sensors);
        let reporter = HttpReporter::from_config(config)?;
        Ok(Self::with_parts(config, Box::new(sensors), Box::new(reporter)))
    }

    /// Create a daemon with explicit sensor and reporter implementations.
    pub fn with_parts(
        config: &AppConfig,
        sensors: Box<dyn SensorReader>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            sensors,
            reporter,
            signals: SignalController::new(),
            poll_interval: config.endpoint.poll_interval(),
            max_consecutive_failures: config.sensors.max_consecutive_failures,
        }
    }

    /// Override the poll interval (tests use milliseconds).
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// A handle on the run/stop flag.
    pub fn signals(&self) -> SignalController {
        self.signals.clone()
    }

    /// Route SIGTERM / SIGINT / SIGHUP to this daemon.
    pub fn install_signal_handlers(&self) -> Result<(), DaemonError> {
        self.signals.install().map_err(DaemonError::Signals)?;
        debug!("signal handlers installed");
        Ok(())
    }

    /// Request a graceful shutdown after the current cycle.
    pub fn shutdown(&self) {
        self.signals.request_stop();
    }

    /// Run cycles until a stop is requested.
    ///
    /// Returns the loop counters on orderly shutdown. A fatal sensor
    /// failure is logged once here and returned.
    pub async fn run(&self) -> Result<LoopStats, DaemonError> {
        info!(
            interval_secs = self.poll_interval.as_secs_f64(),
            "sample loop starting"
        );

        let mut stats = LoopStats::default();
        let mut consecutive_failures = 0u32;

        while self.signals.is_running() {
            let reloads = self.signals.take_reload_requests();
            if reloads > 0 {
                info!(
                    reloads,
                    "reload requested; configuration reload is not supported, keeping current settings"
                );
            }

            if let Err(e) = self.run_cycle(&mut stats, &mut consecutive_failures).await {
                error!(path = %e.path().display(), error = %e, "fatal sensor failure, stopping");
                return Err(e.into());
            }

            if !self.signals.sleep(self.poll_interval).await {
                break;
            }
        }

        info!(
            cycles = stats.cycles,
            sent = stats.sent,
            rejected = stats.rejected,
            send_failures = stats.send_failures,
            sensor_failures = stats.sensor_failures,
            "sample loop stopped"
        );
        Ok(stats)
    }

    /// Run one read-then-send cycle.
    ///
    /// Retryable sensor errors skip the cycle until more than
    /// `max_consecutive_failures` happen in a row; then, like any
    /// non-retryable sensor error, they are returned.
    pub async fn run_cycle(
        &self,
        stats: &mut LoopStats,
        consecutive_failures: &mut u32,
    ) -> Result<CycleOutcome, SensorError> {
        stats.cycles += 1;
        debug!(cycle = stats.cycles, "sample cycle");

        let reading = match self.sensors.read().await {
            Ok(reading) => {
                *consecutive_failures = 0;
                reading
            }
            Err(e) if e.is_retryable() && *consecutive_failures < self.max_consecutive_failures => {
                *consecutive_failures += 1;
                stats.sensor_failures += 1;
                warn!(
                    error = %e,
                    attempt = *consecutive_failures,
                    limit = self.max_consecutive_failures,
                    "skipping cycle, sensor not readable"
                );
                return Ok(CycleOutcome::SensorSkipped);
            }
            Err(e) => {
                stats.sensor_failures += 1;
                return Err(e);
            }
        };

        match self.reporter.send(reading).await {
            Ok(status) => {
                stats.sent += 1;
                if !status.is_success() {
                    stats.rejected += 1;
                }
                Ok(CycleOutcome::Sent(status))
            }
            // Already logged by the reporter; the next cycle is the retry.
            Err(_) => {
                stats.send_failures += 1;
                Ok(CycleOutcome::SendFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::reading::Reading;
    use iotclient_test_utils::config::TestConfigBuilder;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Read(Reading),
        Missing,
        Denied,
    }

    /// Sensor that replays a script of steps, then repeats the last one.
    struct ScriptedSensors {
        script: Mutex<VecDeque<Step>>,
    }

    impl ScriptedSensors {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }

        fn next(&self) -> Result<Reading, SensorError> {
            let mut script = self.script.lock().unwrap();
            let step = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            match step {
                Step::Read(reading) => Ok(reading),
                Step::Missing => Err(SensorError::Unavailable {
                    path: PathBuf::from("/tmp/temp"),
                }),
                Step::Denied => Err(SensorError::Io {
                    path: PathBuf::from("/tmp/status"),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                }),
            }
        }
    }

    impl SensorReader for ScriptedSensors {
        fn read_temperature(&self) -> BoxFuture<'_, Result<f64, SensorError>> {
            Box::pin(async move { self.next().map(|r| r.temperature()) })
        }

        fn read_heater_state(&self) -> BoxFuture<'_, Result<bool, SensorError>> {
            Box::pin(async move { Ok(false) })
        }

        fn read(&self) -> BoxFuture<'_, Result<Reading, SensorError>> {
            Box::pin(async move { self.next() })
        }
    }

    /// Reporter that records readings and answers with a fixed result.
    #[derive(Clone, Default)]
    struct RecordingReporter {
        sent: Arc<Mutex<Vec<Reading>>>,
        fail: bool,
    }

    impl Reporter for RecordingReporter {
        fn send(&self, reading: Reading) -> BoxFuture<'_, Result<StatusCode, ReportError>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(reading);
                if self.fail {
                    Err(ReportError::Endpoint("unreachable".to_string()))
                } else {
                    Ok(StatusCode::OK)
                }
            })
        }
    }

    fn daemon_with(
        max_failures: u32,
        sensors: ScriptedSensors,
        reporter: RecordingReporter,
    ) -> Daemon {
        let config = TestConfigBuilder::new()
            .max_consecutive_failures(max_failures)
            .build();
        let mut daemon = Daemon::with_parts(&config, Box::new(sensors), Box::new(reporter));
        daemon.set_poll_interval(Duration::from_millis(5));
        daemon
    }

    #[tokio::test]
    async fn test_cycle_sends_reading() {
        let reporter = RecordingReporter::default();
        let daemon = daemon_with(
            3,
            ScriptedSensors::new(vec![Step::Read(Reading::new(21.5, true))]),
            reporter.clone(),
        );

        let mut stats = LoopStats::default();
        let mut failures = 0;
        let outcome = daemon.run_cycle(&mut stats, &mut failures).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Sent(StatusCode::OK));
        assert_eq!(*reporter.sent.lock().unwrap(), vec![Reading::new(21.5, true)]);
        assert_eq!(stats.sent, 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_send_failure_does_not_stop_loop() {
        let reporter = RecordingReporter {
            fail: true,
            ..Default::default()
        };
        let daemon = daemon_with(
            3,
            ScriptedSensors::new(vec![Step::Read(Reading::new(20.0, false))]),
            reporter.clone(),
        );

        let mut stats = LoopStats::default();
        let mut failures = 0;
        for _ in 0..3 {
            let outcome = daemon.run_cycle(&mut stats, &mut failures).await.unwrap();
            assert_eq!(outcome, CycleOutcome::SendFailed);
        }
        assert_eq!(stats.send_failures, 3);
        assert_eq!(reporter.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retryable_sensor_errors_escalate_after_limit() {
        let reporter = RecordingReporter::default();
        let daemon = daemon_with(2, ScriptedSensors::new(vec![Step::Missing]), reporter.clone());

        let mut stats = LoopStats::default();
        let mut failures = 0;
        for _ in 0..2 {
            let outcome = daemon.run_cycle(&mut stats, &mut failures).await.unwrap();
            assert_eq!(outcome, CycleOutcome::SensorSkipped);
        }
        let err = daemon.run_cycle(&mut stats, &mut failures).await.unwrap_err();
        assert!(matches!(err, SensorError::Unavailable { .. }));
        assert_eq!(stats.sensor_failures, 3);
        assert!(reporter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_read_resets_failure_count() {
        let reporter = RecordingReporter::default();
        let daemon = daemon_with(
            1,
            ScriptedSensors::new(vec![
                Step::Missing,
                Step::Read(Reading::new(19.0, true)),
                Step::Missing,
                Step::Read(Reading::new(19.5, true)),
            ]),
            reporter.clone(),
        );

        let mut stats = LoopStats::default();
        let mut failures = 0;
        for _ in 0..4 {
            daemon.run_cycle(&mut stats, &mut failures).await.unwrap();
        }
        assert_eq!(stats.sensor_failures, 2);
        assert_eq!(stats.sent, 2);
    }

    #[tokio::test]
    async fn test_zero_limit_makes_first_failure_fatal() {
        let daemon = daemon_with(
            0,
            ScriptedSensors::new(vec![Step::Missing]),
            RecordingReporter::default(),
        );
        let mut stats = LoopStats::default();
        let mut failures = 0;
        assert!(daemon.run_cycle(&mut stats, &mut failures).await.is_err());
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_fatal_immediately() {
        let daemon = daemon_with(
            5,
            ScriptedSensors::new(vec![Step::Denied]),
            RecordingReporter::default(),
        );
        let err = daemon.run().await.unwrap_err();
        match err {
            DaemonError::Sensor(e) => assert_eq!(e.path(), std::path::Path::new("/tmp/status")),
            other => panic!("expected sensor error, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_run_stops_between_cycles() {
        let reporter = RecordingReporter::default();
        let daemon = daemon_with(
            3,
            ScriptedSensors::new(vec![Step::Read(Reading::new(22.0, true))]),
            reporter.clone(),
        );
        let signals = daemon.signals();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            signals.request_stop();
        });

        let stats = daemon.run().await.unwrap();
        stopper.await.unwrap();

        assert!(stats.cycles >= 1);
        // Every started cycle finished its send.
        assert_eq!(stats.sent, stats.cycles);
        assert_eq!(reporter.sent.lock().unwrap().len() as u64, stats.cycles);
    }

    #[tokio::test]
    async fn test_stop_before_run_still_runs_nothing() {
        let daemon = daemon_with(
            3,
            ScriptedSensors::new(vec![Step::Read(Reading::new(22.0, true))]),
            RecordingReporter::default(),
        );
        daemon.shutdown();
        let stats = daemon.run().await.unwrap();
        assert_eq!(stats, LoopStats::default());
    }

    #[tokio::test]
    async fn test_reload_request_keeps_running() {
        let reporter = RecordingReporter::default();
        let daemon = daemon_with(
            3,
            ScriptedSensors::new(vec![Step::Read(Reading::new(22.0, true))]),
            reporter.clone(),
        );
        let signals = daemon.signals();
        signals.request_reload();

        let stopper = {
            let signals = signals.clone();
            let reporter = reporter.clone();
            tokio::spawn(async move {
                while reporter.sent.lock().unwrap().len() < 2 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                signals.request_stop();
            })
        };

        let stats = daemon.run().await.unwrap();
        stopper.await.unwrap();
        assert!(stats.sent >= 2);
        assert_eq!(signals.take_reload_requests(), 0, "loop drained the request");
    }
}
