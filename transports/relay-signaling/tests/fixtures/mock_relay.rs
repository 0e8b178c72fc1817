//! Mock HTTP relay for testing
//!
//! Serves the relay layout on a random local port:
//!
//! - `POST /data/:peer_id` appends the body to the peer's mailbox
//! - `GET /data/:peer_id` pops the oldest message, or 404 when empty
//!
//! Responses can be delayed or replaced by an error status to exercise
//! timeouts and server failures.
//!
//! # Usage
//!
//! ```ignore
//! let relay = MockRelayServer::start().await?;
//! let client = HttpRelayClient::new(&relay.base_url(), Duration::from_secs(1))?;
//!
//! // Use client in tests...
//!
//! relay.shutdown().await?;
//! ```

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct RelayState {
    mailboxes: Mutex<HashMap<String, VecDeque<Bytes>>>,
    delay_ms: AtomicU64,
    fail_status: AtomicU16,
    requests: AtomicUsize,
}

impl RelayState {
    async fn before_request(&self) -> Option<StatusCode> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match self.fail_status.load(Ordering::SeqCst) {
            0 => None,
            status => StatusCode::from_u16(status).ok(),
        }
    }
}

/// Mock relay server for testing
pub struct MockRelayServer {
    /// Server base URL (e.g., "http://127.0.0.1:12345")
    base_url: String,
    /// Shared relay state
    state: Arc<RelayState>,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
}

impl MockRelayServer {
    /// Start the mock relay on a random available port
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        let state = Arc::new(RelayState::default());
        let router = Router::new()
            .route("/data/:peer_id", get(fetch_handler).post(publish_handler))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(Self {
            base_url,
            state,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL to hand to the relay client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Delay every response by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Answer every request with `status` (None restores normal behavior)
    pub fn set_failure(&self, status: Option<u16>) {
        self.state
            .fail_status
            .store(status.unwrap_or(0), Ordering::SeqCst);
    }

    /// Messages waiting for `peer_id`
    pub fn pending(&self, peer_id: &str) -> usize {
        self.state
            .mailboxes
            .lock()
            .get(peer_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Total requests served
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Shutdown the server
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

async fn publish_handler(
    State(state): State<Arc<RelayState>>,
    Path(peer_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    if let Some(status) = state.before_request().await {
        return status;
    }
    state
        .mailboxes
        .lock()
        .entry(peer_id)
        .or_default()
        .push_back(body);
    StatusCode::OK
}

async fn fetch_handler(
    State(state): State<Arc<RelayState>>,
    Path(peer_id): Path<String>,
) -> Result<Bytes, StatusCode> {
    if let Some(status) = state.before_request().await {
        return Err(status);
    }
    let mut mailboxes = state.mailboxes.lock();
    mailboxes
        .get_mut(&peer_id)
        .and_then(VecDeque::pop_front)
        .ok_or(StatusCode::NOT_FOUND)
}
