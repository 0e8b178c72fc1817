//! Relay-polled signaling
//!
//! Handles SDP offer/answer and ICE candidate exchange through a
//! store-and-forward relay.

pub mod coordinator;
pub mod message;
pub mod poll;
pub mod relay;
pub mod signaler;

pub use coordinator::{Coordinator, HandshakeState, NegotiationTarget, SdpKind};
pub use message::{decode, encode, IceCandidate, MessageKind, SignalingMessage};
pub use poll::{PollScheduler, PollState};
pub use relay::{HttpRelayClient, MemoryRelay, RelayClient};
pub use signaler::{RelaySignaler, SendCompletion, SignalerHandle};
