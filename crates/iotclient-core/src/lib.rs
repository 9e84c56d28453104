#![deny(unsafe_code)]

//! iotclient core daemon runtime.
//!
//! Detaches from the invoking terminal, then samples the temperature and
//! heater-state files on a fixed interval and POSTs each reading to the
//! configured collector until a termination signal arrives.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, the return type for async
/// trait methods that need dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are not
/// object-safe, so [`SensorReader`] and [`Reporter`] return this instead.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Sample loop and daemon lifecycle.
pub mod daemon;
/// Fork / setsid / umask / chdir / stdio detachment.
pub mod detach;
/// Subscriber setup and the syslog layer.
pub mod logging;
/// PID file handling and liveness checks.
pub mod pidfile;
/// The per-cycle sensor reading and its wire encoding.
pub mod reading;
/// HTTP reporting of readings to the collector.
pub mod reporter;
/// Sensor file readers.
pub mod sensor;
/// Run/stop flag and Unix signal wiring.
pub mod signals;

pub use daemon::{Daemon, DaemonError, LoopStats};
pub use detach::{Detached, DetachError, daemonize};
pub use reading::Reading;
pub use reporter::{HttpReporter, ReportError, Reporter};
pub use sensor::{FileSensors, SensorError, SensorReader};
pub use signals::SignalController;
