//! Subscriber setup and the syslog layer.
//!
//! Before detaching, events go to stderr so startup progress is visible on
//! the console. Once the standard streams point at `/dev/null`, the
//! [`SyslogLayer`] is the only place log output lands.

use std::fmt::Write as _;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Local syslog socket.
pub const DEFAULT_SYSLOG_SOCKET: &str = "/dev/log";

/// `LOG_DAEMON` facility code.
const FACILITY_DAEMON: u8 = 3;

/// Map a tracing level onto a syslog severity.
fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3, // err
        Level::WARN => 4,  // warning
        Level::INFO => 6,  // info
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Build an RFC 3164 datagram: `<PRI>IDENT[PID]: MESSAGE`.
///
/// The timestamp and hostname are left to the local syslog daemon.
pub fn format_record(ident: &str, pid: u32, level: &Level, message: &str) -> String {
    let priority = FACILITY_DAEMON * 8 + severity(level);
    format!("<{priority}>{ident}[{pid}]: {message}")
}

/// A `tracing` layer that forwards every event to the system logger.
///
/// The socket is connected lazily and reconnected after a failed send, so
/// the layer can be installed before `fork()` and survive a syslog restart.
/// Records that still cannot be delivered are dropped.
#[derive(Debug, Clone)]
pub struct SyslogLayer {
    ident: Arc<str>,
    socket_path: PathBuf,
    socket: Arc<Mutex<Option<UnixDatagram>>>,
}

impl SyslogLayer {
    /// Create a layer that logs to `/dev/log` under `ident`.
    pub fn new(ident: &str) -> Self {
        Self::with_socket_path(ident, DEFAULT_SYSLOG_SOCKET)
    }

    /// Create a layer that logs to an arbitrary datagram socket.
    pub fn with_socket_path(ident: &str, socket_path: impl AsRef<Path>) -> Self {
        Self {
            ident: Arc::from(ident),
            socket_path: socket_path.as_ref().to_path_buf(),
            socket: Arc::new(Mutex::new(None)),
        }
    }

    fn deliver(&self, record: &str) {
        let Ok(mut slot) = self.socket.lock() else {
            return;
        };
        for _ in 0..2 {
            if slot.is_none() {
                *slot = self.connect();
            }
            let Some(socket) = slot.as_ref() else {
                return;
            };
            if socket.send(record.as_bytes()).is_ok() {
                return;
            }
            *slot = None;
        }
    }

    fn connect(&self) -> Option<UnixDatagram> {
        let socket = UnixDatagram::unbound().ok()?;
        socket.connect(&self.socket_path).ok()?;
        Some(socket)
    }
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Read the pid per event: it changes across fork().
        let record = format_record(
            &self.ident,
            std::process::id(),
            event.metadata().level(),
            &event_message(event),
        );
        self.deliver(&record);
    }
}

/// Render an event as `message key=value ...`, the text of a syslog entry.
pub fn event_message(event: &Event<'_>) -> String {
    let mut visitor = RecordVisitor::default();
    event.record(&mut visitor);
    visitor.finish()
}

/// Visitor that renders `message key=value ...` from a tracing event.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
}

impl RecordVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}

/// Pick the filter directive: `-v` overrides the configured level.
pub fn filter_directive(configured: &str, verbose: u8) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber: stderr always, syslog when `syslog` is
/// `Some(ident)`. `RUST_LOG` wins over `level`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(level: &str, syslog: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(syslog.map(SyslogLayer::new))
        .try_init()
        .ok();
}
