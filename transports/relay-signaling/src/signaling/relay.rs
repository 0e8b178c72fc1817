//! Relay clients
//!
//! The relay is a store-and-forward mailbox keyed by peer id. Publishing
//! appends a message for a peer; fetching removes and returns the oldest one.
//! There are no push notifications, so the receiving side polls.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

/// Publish/fetch operations against a relay
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Publish `payload` to the mailbox of `peer_id`
    async fn send(&self, peer_id: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Fetch the oldest pending message for `peer_id`, or `None` if there is none yet
    async fn receive(&self, peer_id: &str) -> Result<Option<Bytes>, TransportError>;
}

/// HTTP relay client (node-dss layout)
///
/// - `POST {base}/data/{peer_id}` publishes the request body
/// - `GET {base}/data/{peer_id}` fetches and clears the oldest message;
///   404 means nothing is waiting
pub struct HttpRelayClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpRelayClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base_url = url::Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {}",
                base_url.scheme()
            )));
        }

        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    fn mailbox_url(&self, peer_id: &str) -> Result<url::Url, TransportError> {
        let mut url = self.base_url.join("data/").map_err(|e| {
            TransportError::InvalidUrl(format!("{}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(peer_id);
        Ok(url)
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn send(&self, peer_id: &str, payload: Bytes) -> Result<(), TransportError> {
        let url = self.mailbox_url(peer_id)?;
        debug!("Publishing {} bytes to {}", payload.len(), url);

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn receive(&self, peer_id: &str) -> Result<Option<Bytes>, TransportError> {
        let url = self.mailbox_url(peer_id)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            trace!("No relay data for {}", peer_id);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(body))
    }
}

/// In-process relay with the same fetch-and-clear semantics
///
/// Used for loopback peers and tests.
#[derive(Default)]
pub struct MemoryRelay {
    mailboxes: Mutex<HashMap<String, VecDeque<Bytes>>>,
}

impl MemoryRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting for `peer_id`
    pub fn pending(&self, peer_id: &str) -> usize {
        self.mailboxes
            .lock()
            .get(peer_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RelayClient for MemoryRelay {
    async fn send(&self, peer_id: &str, payload: Bytes) -> Result<(), TransportError> {
        self.mailboxes
            .lock()
            .entry(peer_id.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn receive(&self, peer_id: &str) -> Result<Option<Bytes>, TransportError> {
        let mut mailboxes = self.mailboxes.lock();
        let Some(queue) = mailboxes.get_mut(peer_id) else {
            return Ok(None);
        };
        let message = queue.pop_front();
        if queue.is_empty() {
            mailboxes.remove(peer_id);
        }
        Ok(message)
    }
}
