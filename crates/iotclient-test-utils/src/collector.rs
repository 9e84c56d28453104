//! A local HTTP collector that records what the reporter sends.
//!
//! [`TestCollector`] binds `127.0.0.1:0`, serves `POST /data` with axum,
//! and keeps every request body for later assertions. The response status
//! is configurable so tests can exercise non-2xx handling.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as the collector saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub body: String,
    pub content_type: Option<String>,
}

struct Shared {
    requests: Mutex<Vec<ReceivedRequest>>,
    status: AtomicU16,
}

/// Recording HTTP collector bound to an ephemeral local port.
///
/// The server task is aborted when this value is dropped.
pub struct TestCollector {
    addr: SocketAddr,
    shared: Arc<Shared>,
    server: JoinHandle<()>,
}

impl TestCollector {
    /// Bind and start serving. Must be called from within a tokio runtime.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test collector");
        let addr = listener.local_addr().expect("listener has no address");

        let shared = Arc::new(Shared {
            requests: Mutex::new(Vec::new()),
            status: AtomicU16::new(200),
        });
        let app = Router::new()
            .route("/data", post(handle_data))
            .with_state(Arc::clone(&shared));

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            shared,
            server,
        }
    }

    /// URL of the collector's `/data` endpoint.
    pub fn url(&self) -> String {
        format!("http://{}/data", self.addr)
    }

    /// Answer subsequent requests with `status`.
    pub fn respond_with(&self, status: u16) {
        self.shared.status.store(status, Ordering::SeqCst);
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.shared
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Poll until at least `count` requests arrived or `timeout` elapses,
    /// then return whatever was received.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<ReceivedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let requests = self.requests();
            if requests.len() >= count || tokio::time::Instant::now() >= deadline {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// A URL on a local port with nothing listening, for connection-refused
    /// tests.
    pub async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind probe listener");
        let addr = listener.local_addr().expect("listener has no address");
        drop(listener);
        format!("http://{addr}/data")
    }
}

impl Drop for TestCollector {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_data(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut requests) = shared.requests.lock() {
        requests.push(ReceivedRequest { body, content_type });
    }
    StatusCode::from_u16(shared.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
