//! Local track lifecycle on a peer connection
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test track_lifecycle_test -- --nocapture
//! ```

mod fixtures;

use fixtures::fake_engine::{EngineCall, FakeEngine};
use fixtures::init_logging;
use parking_lot::Mutex;
use remotemedia_relay_signaling::media::{VideoFrame, VideoRotation};
use remotemedia_relay_signaling::peer::LOCAL_STREAM_ID;
use remotemedia_relay_signaling::{
    ConnectionRegistry, Error, MemoryRelay, PeerConnection, RelaySignaler, RelaySignalingConfig,
    TrackKind, VideoTrackSource,
};
use std::sync::Arc;

const TEST_PIXEL: u32 = 0x7F7F_7F7F;

fn test_frame() -> VideoFrame {
    VideoFrame::filled(16, 16, TEST_PIXEL, 0)
}

#[test]
fn test_new_track_is_enabled_and_streams_frames() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let pc = PeerConnection::new(&registry, engine.clone());
    let source = VideoTrackSource::new("external");

    let track = pc
        .add_local_video_track("local_video_track", source.clone())
        .unwrap();
    assert!(track.is_enabled());
    assert_eq!(
        engine.calls()[0],
        EngineCall::AddTrack(
            TrackKind::Video,
            "local_video_track".to_string(),
            LOCAL_STREAM_ID.to_string()
        )
    );

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    track.set_frame_callback(Box::new(move |frame: &VideoFrame| sink.lock().push(frame.clone())));

    for _ in 0..5 {
        source.deliver_frame(&test_frame());
    }

    let frames = frames.lock();
    assert_eq!(frames.len(), 5);
    assert!(frames
        .iter()
        .all(|f| f.width == 16 && f.height == 16 && f.data.iter().all(|&p| p == TEST_PIXEL)));
}

#[test]
fn test_muted_track_outputs_black_frames() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let pc = PeerConnection::new(&registry, FakeEngine::new("pc1"));
    let source = VideoTrackSource::new("external");
    let track = pc
        .add_local_video_track("local_video_track", source.clone())
        .unwrap();

    track.set_enabled(false);
    assert!(!track.is_enabled());

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    track.set_frame_callback(Box::new(move |frame: &VideoFrame| sink.lock().push(frame.clone())));

    for _ in 0..3 {
        source.deliver_frame(&test_frame());
    }
    track.set_enabled(true);
    source.deliver_frame(&test_frame());

    let frames = frames.lock();
    assert_eq!(frames.len(), 4);
    assert!(frames[..3].iter().all(VideoFrame::is_black));
    assert!(!frames[3].is_black());
}

#[test]
fn test_frames_arrive_upright() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let pc = PeerConnection::new(&registry, FakeEngine::new("pc1"));
    let source = VideoTrackSource::new("external");
    let track = pc.add_local_video_track("rotated", source.clone()).unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    track.set_frame_callback(Box::new(move |frame: &VideoFrame| sink.lock().push(frame.clone())));

    source.deliver_frame(&VideoFrame::filled(32, 16, TEST_PIXEL, 0).with_rotation(VideoRotation::Deg270));

    let frames = frames.lock();
    assert_eq!((frames[0].width, frames[0].height), (16, 32));
    assert_eq!(frames[0].rotation, VideoRotation::Deg0);
}

#[test]
fn test_detach_twice_matches_detach_once() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let pc = PeerConnection::new(&registry, engine.clone());
    let source = VideoTrackSource::new("external");
    let track = pc.add_local_video_track("local_video_track", source.clone()).unwrap();

    assert!(track.detach().unwrap());
    assert!(!track.detach().unwrap());

    assert_eq!(engine.removed_senders(), 1);
    assert!(pc.local_video_tracks().is_empty());
    assert!(!track.is_attached());
    assert!(!track.is_sink_registered());
    assert_eq!(source.sink_count(), 0);

    // Removing through the connection now fails without touching the engine
    assert!(matches!(
        pc.remove_local_video_track(&track),
        Err(Error::TrackNotFound(_))
    ));
    assert_eq!(engine.removed_senders(), 1);

    // A new binding on the same source starts clean
    let again = pc.add_local_video_track("local_video_track", source.clone()).unwrap();
    assert!(again.is_attached());
    assert!(again.sender().is_some());
    assert_ne!(again.sender(), track.sender());
    assert_eq!(source.sink_count(), 1);
    assert_eq!(pc.local_video_tracks().len(), 1);
}

#[test]
fn test_dropping_handle_keeps_connection_ownership() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let pc = PeerConnection::new(&registry, engine.clone());
    let source = VideoTrackSource::new("external");

    drop(pc.add_local_video_track("local_video_track", source.clone()).unwrap());

    // The connection still owns the binding and its sink
    assert_eq!(pc.local_video_tracks().len(), 1);
    assert_eq!(source.sink_count(), 1);
    assert_eq!(engine.removed_senders(), 0);

    let track = pc.local_video_tracks().remove(0);
    pc.remove_local_video_track(&track).unwrap();
    drop(track);
    assert_eq!(source.sink_count(), 0);
    assert_eq!(engine.removed_senders(), 1);
}

#[test]
fn test_registry_lookup_fails_after_close() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let mut pc = PeerConnection::new(&registry, engine.clone());
    let id = pc.id();
    let source = VideoTrackSource::new("external");
    let track = pc.add_local_video_track("local_video_track", source.clone()).unwrap();
    assert_eq!(track.owner_id(), Some(id));

    pc.close().unwrap();

    assert!(!registry.contains(id));
    assert!(track.owner_id().is_none());
    assert!(engine.is_closed());
    assert_eq!(engine.removed_senders(), 1);

    // Closing again is a no-op
    pc.close().unwrap();
    assert_eq!(engine.removed_senders(), 1);
}

#[test]
fn test_track_outliving_connection() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let source = VideoTrackSource::new("external");

    let track = {
        let pc = PeerConnection::new(&registry, engine.clone());
        pc.add_local_video_track("local_video_track", source.clone())
            .unwrap()
    };

    assert!(registry.is_empty());
    assert!(!track.is_attached());
    assert_eq!(source.sink_count(), 0);
    assert!(!track.detach().unwrap());
    drop(track);
    assert_eq!(engine.removed_senders(), 1);
}

#[test]
fn test_audio_track_toggle() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let pc = PeerConnection::new(&registry, engine.clone());

    pc.add_local_audio_track("local_audio_track").unwrap();
    assert!(pc.is_local_audio_track_enabled());
    assert!(matches!(
        pc.add_local_audio_track("another"),
        Err(Error::MediaTrackError(_))
    ));

    pc.set_local_audio_track_enabled(false).unwrap();
    assert!(!pc.is_local_audio_track_enabled());

    pc.remove_local_audio_track().unwrap();
    assert!(!pc.has_local_audio_track());
    assert_eq!(engine.removed_senders(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tracks_detached_when_signaler_drops() {
    init_logging();
    let registry = ConnectionRegistry::new();
    let engine = FakeEngine::new("pc1");
    let source = VideoTrackSource::new("external");

    let signaler = RelaySignaler::new(
        RelaySignalingConfig::default().with_remote_peer_id("pc2"),
        Arc::new(MemoryRelay::new()),
        tokio::runtime::Handle::current(),
        PeerConnection::new(&registry, engine.clone()),
    )
    .unwrap();

    let track = signaler
        .peer()
        .add_local_video_track("local_video_track", source.clone())
        .unwrap();
    signaler.peer().add_local_audio_track("local_audio_track").unwrap();

    drop(signaler);

    assert!(registry.is_empty());
    assert!(!track.is_attached());
    assert_eq!(source.sink_count(), 0);
    assert_eq!(engine.removed_senders(), 2);
    assert!(engine.is_closed());
}
