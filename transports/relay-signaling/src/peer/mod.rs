//! Peer connections
//!
//! Owns local tracks, their senders and data channels, and exposes the
//! negotiation operations the signaling coordinator drives.

pub mod connection;
pub mod data_channel;
pub mod engine;
pub mod registry;
pub mod rtc;

pub use connection::{PeerConnection, LOCAL_STREAM_ID};
pub use data_channel::{DataChannelConfig, DataChannelId, DataChannelInfo, DataChannelState};
pub use engine::{EngineObserver, IceConnectionState, ObserverSet, RtcEngine, RtpSenderId};
pub use registry::{ConnectionId, ConnectionRef, ConnectionRegistry};
pub use rtc::WebRtcEngine;
