//! Local media: raw video frames, video sources and track bindings

pub mod frame;
pub mod source;
pub mod track;

pub use frame::{VideoFrame, VideoRotation, VideoSink, ARGB_BLACK};
pub use source::{SinkId, SinkWants, VideoTrackSource};
pub use track::{FrameCallback, LocalVideoTrack, MediaStreamTrack, TrackKind};
