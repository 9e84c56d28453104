#![deny(unsafe_code)]

//! iotclientd: command-line front end for the iotclient daemon.
//!
//! Everything up to and including the fork runs synchronously. The tokio
//! runtime is only built afterwards, inside the process that keeps it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use iotclient_config::AppConfig;
use iotclient_core::pidfile::{self, PidFile};
use iotclient_core::{
    Daemon, DaemonError, Detached, FileSensors, HttpReporter, Reporter, SensorReader, build_info,
    daemonize, logging,
};
use tracing::{error, info};

/// Exit status of `status` when no daemon is running (LSB "not running").
const EXIT_NOT_RUNNING: u8 = 3;

/// How long `stop` waits for the daemon to finish its last cycle.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// iotclientd: report temperature and heater state to a collector.
#[derive(Parser)]
#[command(name = "iotclientd", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "/etc/iotclientd.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detach and start the sample loop.
    Start {
        /// Stay attached to the terminal and log to stderr.
        #[arg(long)]
        foreground: bool,
    },

    /// Stop a running daemon and wait for it to exit.
    Stop,

    /// Show whether the daemon is running.
    Status,

    /// Read the sensors once and print the encoded reading.
    Sample {
        /// Also POST the reading to the collector.
        #[arg(long)]
        send: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("iotclientd: {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    // Only the long-running daemon writes to syslog.
    let syslog = matches!(cli.command, Commands::Start { .. }) && config.logging.syslog;
    logging::init(
        logging::filter_directive(&config.logging.level, cli.verbose),
        syslog.then_some(config.daemon.ident.as_str()),
    );
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let result = match cli.command {
        Commands::Start { foreground } => cmd_start(&config, foreground),
        Commands::Stop => cmd_stop(&config.daemon.pid_file),
        Commands::Status => cmd_status(&config.daemon.pid_file),
        Commands::Sample { send } => cmd_sample(&config, send),
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_start(config: &AppConfig, foreground: bool) -> Result<ExitCode> {
    if !foreground {
        config.validate_for_detach()?;
    }
    pidfile::ensure_not_running(&config.daemon.pid_file)?;

    if !foreground {
        match daemonize()? {
            Detached::Parent { child } => {
                println!("iotclientd started (pid {child})");
                return Ok(ExitCode::SUCCESS);
            }
            Detached::Worker(identity) => {
                info!(pid = identity.pid, sid = identity.sid, "detached from terminal");
            }
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve(config))
}

/// Run the daemon under a pid file, removing it however the loop ends.
///
/// Signal handlers must be installed before the pid file exists, since
/// `stop` signals whatever pid it finds there.
async fn serve(config: &AppConfig) -> Result<ExitCode> {
    info!(version = %build_info::version_string(), "starting iotclient daemon");
    let daemon = Daemon::new(config)?;
    daemon.install_signal_handlers()?;

    let pid_file = PidFile::create(&config.daemon.pid_file, std::process::id())?;
    let outcome = run_daemon(&daemon).await;
    pid_file.remove();
    outcome
}

async fn run_daemon(daemon: &Daemon) -> Result<ExitCode> {
    match daemon.run().await {
        Ok(stats) => {
            info!(cycles = stats.cycles, sent = stats.sent, "daemon exiting");
            Ok(ExitCode::SUCCESS)
        }
        // Logged by the loop already.
        Err(DaemonError::Sensor(_)) => Ok(ExitCode::FAILURE),
        Err(e) => Err(e.into()),
    }
}

fn cmd_stop(pid_path: &Path) -> Result<ExitCode> {
    let Some(pid) = pidfile::running_pid(pid_path) else {
        println!("iotclientd is not running");
        return Ok(ExitCode::SUCCESS);
    };

    pidfile::terminate(pid).with_context(|| format!("failed to signal pid {pid}"))?;
    info!(pid, "stop requested");

    // The daemon removes its pid file as the last step of a clean exit.
    let deadline = Instant::now() + STOP_TIMEOUT;
    while pidfile::running_pid(pid_path) == Some(pid) {
        if Instant::now() >= deadline {
            bail!("daemon (pid {pid}) did not exit within {}s", STOP_TIMEOUT.as_secs());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("iotclientd stopped (pid {pid})");
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(pid_path: &Path) -> Result<ExitCode> {
    match pidfile::running_pid(pid_path) {
        Some(pid) => {
            println!("iotclientd is running (pid {pid})");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("iotclientd is not running");
            Ok(ExitCode::from(EXIT_NOT_RUNNING))
        }
    }
}

fn cmd_sample(config: &AppConfig, send: bool) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async {
        let reading = FileSensors::from_config(&config.sensors).read().await?;
        println!("{}", reading.form_body()?);

        if send {
            let status = HttpReporter::from_config(config)?.send(reading).await?;
            println!("collector answered {status}");
        }
        Ok::<_, anyhow::Error>(ExitCode::SUCCESS)
    })
}

fn cmd_config(path: &Path, config: &AppConfig, show: bool) -> Result<ExitCode> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
