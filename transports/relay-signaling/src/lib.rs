//! Relay-polled WebRTC signaling for RemoteMedia peers
//!
//! This crate negotiates a peer-to-peer WebRTC session through a
//! store-and-forward HTTP relay and manages the lifecycle of the local
//! tracks attached to the resulting connection.
//!
//! # Features
//!
//! - **Relay signaling**: SDP offer/answer and trickled ICE over a polled relay
//! - **Single-flight polling**: at most one relay receive outstanding
//! - **Single-threaded handshake state**: one processing context owns all
//!   signaling state; relay I/O reports back through a dispatch queue
//! - **Local track lifecycle**: attach-once/detach-once bindings between a
//!   track, its RTP sender and the owning connection
//! - **Data channels and peer events**: data channels, remote track and ICE
//!   connection state events, fanned out with [`ObserverSet`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Processing context (one thread)                         │
//! │  RelaySignaler::update(delta_ms)                         │
//! │  ├─ DispatchQueue (drained first)                        │
//! │  ├─ PollScheduler ──► RelayClient::receive (tokio task)  │
//! │  ├─ message::decode ─► Coordinator                       │
//! │  │                    └─► PeerConnection (Negotiation)   │
//! │  └─ message::encode ─► RelayClient::send (tokio task)    │
//! │                                                          │
//! │  PeerConnection                                          │
//! │  ├─ RtcEngine (webrtc-rs)  ── events ──► SignalerHandle  │
//! │  └─ LocalVideoTrack ── FrameObserver ◄── VideoTrackSource│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use remotemedia_relay_signaling::RelaySignalingConfig;
//!
//! let config = RelaySignalingConfig::default()
//!     .with_local_peer_id("hololens")
//!     .with_remote_peer_id("desktop");
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.poll_interval_ms, 500.0);
//! ```
//!
//! ## Driving a signaler
//!
//! ```no_run
//! use remotemedia_relay_signaling::{
//!     MemoryRelay, NegotiationTarget, RelaySignaler, RelaySignalingConfig, SdpKind,
//! };
//! use std::sync::Arc;
//!
//! struct Loopback;
//!
//! impl NegotiationTarget for Loopback {
//!     fn set_remote_description(&mut self, _: SdpKind, _: &str) -> remotemedia_relay_signaling::Result<()> { Ok(()) }
//!     fn create_offer(&mut self) -> remotemedia_relay_signaling::Result<String> { Ok("offer".into()) }
//!     fn create_answer(&mut self) -> remotemedia_relay_signaling::Result<String> { Ok("answer".into()) }
//!     fn add_ice_candidate(&mut self, _: &str, _: u32, _: &str) -> remotemedia_relay_signaling::Result<()> { Ok(()) }
//! }
//!
//! # fn example() -> remotemedia_relay_signaling::Result<()> {
//! let runtime = tokio::runtime::Runtime::new().map_err(anyhow::Error::from)?;
//! let config = RelaySignalingConfig::default().with_remote_peer_id("desktop");
//! let mut signaler = RelaySignaler::new(
//!     config,
//!     Arc::new(MemoryRelay::new()),
//!     runtime.handle().clone(),
//!     Loopback,
//! )?;
//!
//! signaler.start_offer()?;
//! loop {
//!     signaler.update(16.0);
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;

// Re-exports for public API
pub use config::{PeerIdentity, RelaySignalingConfig};
pub use dispatch::DispatchQueue;
pub use error::{Error, Result, TransportError};
pub use media::{LocalVideoTrack, MediaStreamTrack, TrackKind, VideoFrame, VideoTrackSource};
pub use peer::{
    ConnectionId, ConnectionRegistry, DataChannelConfig, DataChannelId, DataChannelInfo,
    DataChannelState, EngineObserver, IceConnectionState, ObserverSet, PeerConnection, RtcEngine,
    RtpSenderId, WebRtcEngine,
};
pub use signaling::{
    decode, encode, HandshakeState, HttpRelayClient, IceCandidate, MemoryRelay, MessageKind, NegotiationTarget,
    RelayClient, RelaySignaler, SdpKind, SignalerHandle, SignalingMessage,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
