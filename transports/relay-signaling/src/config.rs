//! Configuration types for relay signaling

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default separator joining the ICE candidate fields on the wire
pub const DEFAULT_ICE_DATA_SEPARATOR: &str = "|";

/// Prefix of the environment variables read by [`RelaySignalingConfig::from_env`]
pub const ENV_PREFIX: &str = "RELAY_SIGNALING_";

/// Main configuration for a relay-signaled peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySignalingConfig {
    /// Relay base URL (http:// or https://)
    pub relay_url: String,

    /// Local peer ID, used as the relay key we poll (auto-generated if None)
    pub local_peer_id: Option<String>,

    /// Remote peer ID, used as the relay key we publish to
    ///
    /// May be empty at startup but must be set before anything is sent.
    pub remote_peer_id: String,

    /// Interval between relay polls in milliseconds (default: 500)
    pub poll_interval_ms: f64,

    /// Poll the relay on a timer; when false the handshake is driven by explicit poll requests
    pub polling_enabled: bool,

    /// Relay request timeout in milliseconds (default: 5000)
    pub request_timeout_ms: u64,

    /// Separator used to join ICE candidate fields (default: "|")
    pub ice_data_separator: String,

    /// Create and send a new offer when the connection reports renegotiation is needed
    pub auto_renegotiate: bool,

    /// STUN server URLs handed to the WebRTC engine
    pub stun_servers: Vec<String>,
}

impl Default for RelaySignalingConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:3000".to_string(),
            local_peer_id: None,
            remote_peer_id: String::new(),
            poll_interval_ms: 500.0,
            polling_enabled: true,
            request_timeout_ms: 5000,
            ice_data_separator: DEFAULT_ICE_DATA_SEPARATOR.to_string(),
            auto_renegotiate: false,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

impl RelaySignalingConfig {
    /// Validate configuration parameters
    ///
    /// An empty `remote_peer_id` is accepted here; it is only rejected when a
    /// message is actually sent.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not an http(s) URL
    /// - `poll_interval_ms` is not a positive finite number
    /// - `request_timeout_ms` is zero
    /// - `ice_data_separator` is empty
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.relay_url).map_err(|e| {
            Error::ConfigurationError(format!("relay_url {} is invalid: {}", self.relay_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::ConfigurationError(format!(
                "relay_url must start with http:// or https://, got: {}",
                self.relay_url
            )));
        }

        if !self.poll_interval_ms.is_finite() || self.poll_interval_ms <= 0.0 {
            return Err(Error::ConfigurationError(format!(
                "poll_interval_ms must be positive, got {}",
                self.poll_interval_ms
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::ConfigurationError(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.ice_data_separator.is_empty() {
            return Err(Error::ConfigurationError(
                "ice_data_separator cannot be empty".to_string(),
            ));
        }

        if let Some(local) = &self.local_peer_id {
            if local.trim().is_empty() {
                return Err(Error::ConfigurationError(
                    "local_peer_id cannot be blank when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Overlay `RELAY_SIGNALING_*` environment variables on top of this config
    ///
    /// Recognized variables: `URL`, `LOCAL_PEER_ID`, `REMOTE_PEER_ID`,
    /// `POLL_INTERVAL_MS`, `POLLING_ENABLED`, `REQUEST_TIMEOUT_MS`,
    /// `AUTO_RENEGOTIATE` and `STUN_SERVERS` (comma-separated). Unparseable
    /// values are ignored and the current value is kept.
    pub fn from_env(self) -> Self {
        self.overlay(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("URL") {
            self.relay_url = url;
        }
        if let Some(local) = var("LOCAL_PEER_ID") {
            if !local.trim().is_empty() {
                self.local_peer_id = Some(local);
            }
        }
        if let Some(remote) = var("REMOTE_PEER_ID") {
            self.remote_peer_id = remote;
        }
        if let Some(interval) = var("POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = interval;
        }
        if let Some(enabled) = var("POLLING_ENABLED").and_then(|v| v.parse().ok()) {
            self.polling_enabled = enabled;
        }
        if let Some(timeout) = var("REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.request_timeout_ms = timeout;
        }
        if let Some(auto) = var("AUTO_RENEGOTIATE").and_then(|v| v.parse().ok()) {
            self.auto_renegotiate = auto;
        }
        if let Some(servers) = var("STUN_SERVERS") {
            let servers: Vec<String> = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !servers.is_empty() {
                self.stun_servers = servers;
            }
        }
        self
    }

    /// Set the remote peer ID
    pub fn with_remote_peer_id(mut self, remote_peer_id: &str) -> Self {
        self.remote_peer_id = remote_peer_id.to_string();
        self
    }

    /// Set the local peer ID
    pub fn with_local_peer_id(mut self, local_peer_id: &str) -> Self {
        self.local_peer_id = Some(local_peer_id.to_string());
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: f64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Switch to manual mode (no timer-driven polls)
    pub fn manual(mut self) -> Self {
        self.polling_enabled = false;
        self
    }
}

/// Local and remote relay keys for one signaling session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    local_id: String,
    remote_id: String,
}

impl PeerIdentity {
    /// Build an identity, generating a UUID for the local id when none is given
    pub fn new(local_id: Option<String>, remote_id: impl Into<String>) -> Self {
        let local_id = local_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            local_id,
            remote_id: remote_id.into(),
        }
    }

    /// Build the identity described by a config
    pub fn from_config(config: &RelaySignalingConfig) -> Self {
        Self::new(config.local_peer_id.clone(), config.remote_peer_id.clone())
    }

    /// Relay key this peer polls
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Relay key this peer publishes to (may be empty)
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Change the remote peer
    pub fn set_remote_id(&mut self, remote_id: impl Into<String>) {
        self.remote_id = remote_id.into();
    }

    /// Remote id to send to, or a configuration error if it is not set
    pub fn send_target(&self) -> Result<&str> {
        if self.remote_id.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "remote peer id must be set before sending".to_string(),
            ));
        }
        Ok(&self.remote_id)
    }
}
