//! Real signal delivery into the sample loop.
//!
//! Lives in its own test binary: tokio's handlers are process-wide once
//! installed, so raising SIGTERM here cannot disturb other tests.

use std::time::Duration;

use iotclient_core::Daemon;
use iotclient_test_utils::collector::TestCollector;
use iotclient_test_utils::sensors::SensorFixture;

fn raise(signal: libc::c_int) {
    // SAFETY: raise(3) on our own process; tokio's handler is installed.
    assert_eq!(unsafe { libc::raise(signal) }, 0);
}

#[test_log::test(tokio::test)]
async fn test_sighup_is_acknowledged_and_sigterm_stops() {
    let collector = TestCollector::start().await;
    let fixture = SensorFixture::with_values("22.5", "ON");
    let config = fixture.config_builder().endpoint_url(&collector.url()).build();

    let mut daemon = Daemon::new(&config).unwrap();
    daemon.set_poll_interval(Duration::from_millis(20));
    daemon.install_signal_handlers().unwrap();
    let signals = daemon.signals();

    let run = tokio::spawn(async move { daemon.run().await });
    collector.wait_for_requests(1, Duration::from_secs(10)).await;

    raise(libc::SIGHUP);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(signals.is_running(), "SIGHUP must not stop the daemon");

    let before = collector.requests().len();
    collector
        .wait_for_requests(before + 1, Duration::from_secs(10))
        .await;

    raise(libc::SIGTERM);
    let stats = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("loop did not stop after SIGTERM")
        .unwrap()
        .unwrap();

    assert!(!signals.is_running());
    assert!(stats.sent > before as u64);
    assert_eq!(stats.sent, stats.cycles, "no cycle was cut short");
}
