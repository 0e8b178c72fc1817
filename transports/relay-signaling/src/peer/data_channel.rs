//! Data channel types
//!
//! Channels are owned by the engine; a [`PeerConnection`](super::PeerConnection)
//! refers to them by [`DataChannelId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a data channel known to an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataChannelId(u64);

impl DataChannelId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        DataChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DataChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Options for a locally created data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelConfig {
    /// Channel label
    pub label: String,
    /// Deliver messages in order
    pub ordered: bool,
    /// Retransmit lost messages
    pub reliable: bool,
    /// Pre-agreed SCTP stream id for an out-of-band negotiated channel;
    /// None lets the engine announce the channel in-band
    pub negotiated_id: Option<u16>,
}

impl DataChannelConfig {
    /// Ordered, reliable, in-band channel named `label`
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ordered: true,
            reliable: true,
            negotiated_id: None,
        }
    }

    /// Use out-of-band negotiation on stream `id`
    pub fn negotiated(mut self, id: u16) -> Self {
        self.negotiated_id = Some(id);
        self
    }

    /// Allow out-of-order delivery
    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    /// Drop lost messages instead of retransmitting them
    pub fn unreliable(mut self) -> Self {
        self.reliable = false;
        self
    }
}

/// A data channel as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInfo {
    /// Engine-local handle
    pub id: DataChannelId,
    /// Channel label
    pub label: String,
    /// Stream id for negotiated channels
    pub negotiated_id: Option<u16>,
}

/// Data channel readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}
