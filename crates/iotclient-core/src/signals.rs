//! Run/stop flag and Unix signal wiring.
//!
//! The sample loop owns a [`SignalController`] and polls it once per cycle.
//! Signal delivery only flips state here; the loop does all I/O and
//! teardown after it observes the change.
//!
//! - SIGTERM / SIGINT: clear the running flag and wake the loop's sleep.
//! - SIGHUP: record a reload request. Reloading is not supported; the loop
//!   acknowledges the request in the log and carries on unchanged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    reload_requests: AtomicU64,
    wake: Notify,
}

/// Shared run/stop state. Cheap to clone; all clones see the same flag.
#[derive(Debug, Clone)]
pub struct SignalController {
    shared: Arc<Shared>,
}

impl SignalController {
    /// Create a controller in the running state.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(true),
                reload_requests: AtomicU64::new(0),
                wake: Notify::new(),
            }),
        }
    }

    /// Whether the loop should keep going.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop after its current cycle.
    ///
    /// Returns `false` if a stop had already been requested.
    pub fn request_stop(&self) -> bool {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        // notify_one stores a permit if the loop is not sleeping yet.
        self.shared.wake.notify_one();
        was_running
    }

    /// Record a reload request.
    pub fn request_reload(&self) {
        self.shared.reload_requests.fetch_add(1, Ordering::SeqCst);
    }

    /// Drain pending reload requests, returning how many arrived.
    pub fn take_reload_requests(&self) -> u64 {
        self.shared.reload_requests.swap(0, Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if a stop is requested.
    ///
    /// Returns whether the loop should keep running afterwards.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shared.wake.notified() => {}
        }
        self.is_running()
    }

    /// Route SIGTERM, SIGINT and SIGHUP into this controller.
    ///
    /// Must be called from within a tokio runtime. The returned task ends
    /// after the first termination signal; it is dropped with the runtime
    /// otherwise.
    pub fn install(&self) -> std::io::Result<JoinHandle<()>> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let controller = self.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, stopping after the current cycle");
                        controller.request_stop();
                        break;
                    }
                    _ = sigint.recv() => {
                        info!("received SIGINT, stopping after the current cycle");
                        controller.request_stop();
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("received SIGHUP");
                        controller.request_reload();
                    }
                }
            }
        }))
    }
}

impl Default for SignalController {
    fn default() -> Self {
        Self::new()
    }
}
