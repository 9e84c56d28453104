//! Drives the `iotclientd` binary end to end.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use iotclient_test_utils::collector::TestCollector;
use iotclient_test_utils::sensors::SensorFixture;
use pretty_assertions::assert_eq;
use tokio::process::{Child, Command};

fn iotclientd(config: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_iotclientd"));
    cmd.arg("--config").arg(config);
    for var in ["RUST_LOG", "HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
        cmd.env_remove(var);
    }
    cmd
}

async fn run(config: &Path, args: &[&str]) -> Output {
    iotclientd(config).args(args).output().await.unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Config file and pid file live next to the sensor files.
fn write_config(fixture: &SensorFixture, url: &str) -> (PathBuf, PathBuf) {
    let config_path = fixture.dir().join("iotclientd.toml");
    let pid_path = fixture.dir().join("iotclientd.pid");
    fixture
        .config_builder()
        .endpoint_url(url)
        .poll_interval_secs(1)
        .pid_file(&pid_path)
        .write_to(&config_path);
    (config_path, pid_path)
}

async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..200 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn spawn_foreground(config: &Path) -> Child {
    iotclientd(config)
        .args(["start", "--foreground"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

async fn wait_exit(child: &mut Child) -> ExitStatus {
    tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("daemon did not exit")
        .unwrap()
}

fn send_sigterm(child: &Child) {
    let pid = child.id().expect("daemon already reaped") as libc::pid_t;
    // SAFETY: kill(2) on a child we spawned and have not yet reaped.
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);
}

#[tokio::test]
async fn test_config_show_prints_resolved_values() {
    let fixture = SensorFixture::new();
    let (config, _) = write_config(&fixture, "http://192.0.2.10:8080/data");

    let output = run(&config, &["config", "--show"]).await;
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("url = \"http://192.0.2.10:8080/data\""), "{text}");
    assert!(text.contains("poll_interval_secs = 1"), "{text}");
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[endpoint]\nurl = \"ftp://collector/data\"\n").unwrap();

    let output = run(&config, &["config"]).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.toml"), "{stderr}");
}

#[tokio::test]
async fn test_sample_prints_encoded_reading() {
    let fixture = SensorFixture::with_values("23.456\n", "ON\n");
    let (config, _) = write_config(&fixture, "http://127.0.0.1:9/data");

    let output = run(&config, &["sample"]).await;
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "temperature=23.46&heater_state=ON\n");
}

#[tokio::test]
async fn test_sample_send_posts_once() {
    let collector = TestCollector::start().await;
    let fixture = SensorFixture::with_values("18", "OFF");
    let (config, _) = write_config(&fixture, &collector.url());

    let output = run(&config, &["sample", "--send"]).await;
    assert!(output.status.success(), "{output:?}");

    let requests = collector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, "temperature=18.00&heater_state=OFF");
}

#[tokio::test]
async fn test_sample_with_missing_sensor_fails() {
    let fixture = SensorFixture::new();
    fixture.write_heater_state("ON");
    let (config, _) = write_config(&fixture, "http://127.0.0.1:9/data");

    let output = run(&config, &["sample"]).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(&fixture.temperature_path().display().to_string()),
        "{stderr}"
    );
}

#[tokio::test]
async fn test_status_without_daemon() {
    let fixture = SensorFixture::new();
    let (config, _) = write_config(&fixture, "http://127.0.0.1:9/data");

    let output = run(&config, &["status"]).await;
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "iotclientd is not running\n");

    let output = run(&config, &["stop"]).await;
    assert!(output.status.success());
}

#[tokio::test]
async fn test_start_detaches_reports_and_stops() {
    let collector = TestCollector::start().await;
    let fixture = SensorFixture::with_values("21.5", "ON");
    let (config, pid_path) = write_config(&fixture, &collector.url());

    let output = run(&config, &["start"]).await;
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).starts_with("iotclientd started (pid "));

    assert!(wait_for_file(&pid_path).await, "worker never wrote its pid file");
    let requests = collector.wait_for_requests(2, Duration::from_secs(10)).await;
    assert!(requests.len() >= 2, "{requests:?}");
    assert_eq!(requests[0].body, "temperature=21.50&heater_state=ON");
    assert_eq!(
        requests[0].content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );

    let status = run(&config, &["status"]).await;
    assert!(status.status.success(), "{status:?}");

    // A second instance refuses to start while the first is alive.
    let again = run(&config, &["start"]).await;
    assert!(!again.status.success());

    let stop = run(&config, &["stop"]).await;
    assert!(stop.status.success(), "{stop:?}");
    assert!(!pid_path.exists(), "pid file removed on clean exit");

    let after = collector.requests().len();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(collector.requests().len(), after, "no reports after stop");
}

#[tokio::test]
async fn test_foreground_stop_exits_zero_and_removes_pid_file() {
    let collector = TestCollector::start().await;
    let fixture = SensorFixture::with_values("20.5", "OFF");
    let (config, pid_path) = write_config(&fixture, &collector.url());

    let mut daemon = spawn_foreground(&config);
    assert!(wait_for_file(&pid_path).await, "daemon never wrote its pid file");
    collector.wait_for_requests(1, Duration::from_secs(10)).await;

    let stop = run(&config, &["stop"]).await;
    assert!(stop.status.success(), "{stop:?}");

    let status = wait_exit(&mut daemon).await;
    assert_eq!(status.code(), Some(0));
    assert!(!pid_path.exists());
    assert_eq!(
        collector.requests()[0].body,
        "temperature=20.50&heater_state=OFF"
    );
}

#[tokio::test]
async fn test_sigterm_right_after_pid_file_appears_is_graceful() {
    let collector = TestCollector::start().await;
    let fixture = SensorFixture::with_values("20.5", "ON");
    let (config, pid_path) = write_config(&fixture, &collector.url());

    let mut daemon = spawn_foreground(&config);
    let mut appeared = false;
    for _ in 0..10_000 {
        if pid_path.exists() {
            appeared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(appeared, "daemon never wrote its pid file");
    send_sigterm(&daemon);

    let status = wait_exit(&mut daemon).await;
    assert_eq!(status.code(), Some(0), "{status:?}");
    assert!(!pid_path.exists(), "pid file left behind");
}

#[tokio::test]
async fn test_missing_sensor_ends_daemon_with_one_error() {
    let fixture = SensorFixture::new();
    fixture.write_heater_state("ON");
    let config = fixture.dir().join("iotclientd.toml");
    let pid_path = fixture.dir().join("iotclientd.pid");
    fixture
        .config_builder()
        .endpoint_url("http://127.0.0.1:9/data")
        .max_consecutive_failures(0)
        .pid_file(&pid_path)
        .write_to(&config);

    let output = iotclientd(&config)
        .args(["start", "--foreground"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let errors: Vec<&str> = stderr.lines().filter(|l| l.contains("ERROR")).collect();
    assert_eq!(errors.len(), 1, "{stderr}");
    assert!(
        errors[0].contains(&fixture.temperature_path().display().to_string()),
        "{stderr}"
    );
    assert!(!pid_path.exists());
}
