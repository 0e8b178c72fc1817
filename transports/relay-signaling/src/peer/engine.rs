//! Media engine abstraction
//!
//! [`RtcEngine`] is the surface a [`PeerConnection`](super::PeerConnection)
//! needs from a WebRTC implementation. Calls are synchronous and made from
//! the processing context; engine events flow back through an
//! [`EngineObserver`].

use crate::media::TrackKind;
use crate::peer::data_channel::{DataChannelConfig, DataChannelId, DataChannelInfo, DataChannelState};
use crate::signaling::{IceCandidate, SdpKind};
use crate::Result;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an RTP sender created by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtpSenderId(u64);

impl RtpSenderId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        RtpSenderId(NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RtpSenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender-{}", self.0)
    }
}

/// Connectivity of the ICE transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

/// Events raised by an engine, possibly from its own threads
///
/// Only the signaling events are required; the rest default to no-ops.
pub trait EngineObserver: Send + Sync {
    /// A local ICE candidate was gathered
    fn on_ice_candidate(&self, candidate: IceCandidate);

    /// The session needs a new offer/answer round
    fn on_renegotiation_needed(&self);

    /// The offer/answer exchange completed
    fn on_connected(&self);

    /// The ICE transport changed state
    fn on_ice_connection_state_change(&self, _state: IceConnectionState) {}

    /// The remote peer started sending a track
    fn on_remote_track_added(&self, _kind: TrackKind) {}

    /// A remote track went away
    fn on_remote_track_removed(&self, _kind: TrackKind) {}

    /// A data channel was created locally or announced by the remote peer
    fn on_data_channel_added(&self, _channel: &DataChannelInfo) {}

    /// A data channel was removed
    fn on_data_channel_removed(&self, _channel: &DataChannelInfo) {}

    /// A data channel changed state
    fn on_data_channel_state_change(&self, _id: DataChannelId, _state: DataChannelState) {}

    /// A message arrived on a data channel
    fn on_data_channel_message(&self, _id: DataChannelId, _data: Bytes) {}
}

/// Forwards every engine event to each observer in turn
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn with(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl EngineObserver for ObserverSet {
    fn on_ice_candidate(&self, candidate: IceCandidate) {
        for observer in &self.observers {
            observer.on_ice_candidate(candidate.clone());
        }
    }

    fn on_renegotiation_needed(&self) {
        self.observers.iter().for_each(|o| o.on_renegotiation_needed());
    }

    fn on_connected(&self) {
        self.observers.iter().for_each(|o| o.on_connected());
    }

    fn on_ice_connection_state_change(&self, state: IceConnectionState) {
        self.observers
            .iter()
            .for_each(|o| o.on_ice_connection_state_change(state));
    }

    fn on_remote_track_added(&self, kind: TrackKind) {
        self.observers.iter().for_each(|o| o.on_remote_track_added(kind));
    }

    fn on_remote_track_removed(&self, kind: TrackKind) {
        self.observers.iter().for_each(|o| o.on_remote_track_removed(kind));
    }

    fn on_data_channel_added(&self, channel: &DataChannelInfo) {
        self.observers.iter().for_each(|o| o.on_data_channel_added(channel));
    }

    fn on_data_channel_removed(&self, channel: &DataChannelInfo) {
        self.observers
            .iter()
            .for_each(|o| o.on_data_channel_removed(channel));
    }

    fn on_data_channel_state_change(&self, id: DataChannelId, state: DataChannelState) {
        self.observers
            .iter()
            .for_each(|o| o.on_data_channel_state_change(id, state));
    }

    fn on_data_channel_message(&self, id: DataChannelId, data: Bytes) {
        for observer in &self.observers {
            observer.on_data_channel_message(id, data.clone());
        }
    }
}

/// Peer connection operations provided by a WebRTC implementation
pub trait RtcEngine: Send + Sync {
    /// Install the observer receiving engine events
    fn set_observer(&self, observer: Arc<dyn EngineObserver>);

    /// Apply a remote offer or answer
    fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Create an offer and install it as the local description
    fn create_offer(&self) -> Result<String>;

    /// Create an answer and install it as the local description
    fn create_answer(&self) -> Result<String>;

    /// Apply a remote ICE candidate
    fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Add a local track to the stream `stream_id`, returning its sender
    fn add_track(&self, kind: TrackKind, track_id: &str, stream_id: &str) -> Result<RtpSenderId>;

    /// Stop and remove a sender
    fn remove_track(&self, sender: RtpSenderId) -> Result<()>;

    /// Create a data channel and announce it through the observer
    fn add_data_channel(&self, config: &DataChannelConfig) -> Result<DataChannelInfo>;

    /// Close a data channel and announce its removal
    ///
    /// Fails with [`Error::DataChannelError`](crate::Error::DataChannelError)
    /// for channels the engine does not know.
    fn remove_data_channel(&self, id: DataChannelId) -> Result<()>;

    /// Send a binary message on a data channel
    fn send_data(&self, id: DataChannelId, data: &[u8]) -> Result<()>;

    /// Data channels currently known, local and remote
    fn data_channels(&self) -> Vec<DataChannelInfo>;

    /// Close the underlying connection
    fn close(&self) -> Result<()>;
}
