//! Media tracks and the local video track binding
//!
//! A [`LocalVideoTrack`] ties together a track, the RTP sender that
//! transmits it and the connection that owns that sender. The binding is
//! attached once when the connection adds the track and detached once when
//! the track is removed or the connection closes.

use crate::media::frame::{VideoFrame, VideoSink};
use crate::media::source::{SinkId, SinkWants, VideoTrackSource};
use crate::peer::{ConnectionId, ConnectionRef, RtpSenderId};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Media type of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// A local media track
///
/// New tracks are enabled. A disabled video track keeps producing frames,
/// but they are black.
#[derive(Debug)]
pub struct MediaStreamTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    source: Option<Arc<VideoTrackSource>>,
}

impl MediaStreamTrack {
    /// Create a video track fed by `source`
    pub fn video(id: impl Into<String>, source: Arc<VideoTrackSource>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind: TrackKind::Video,
            enabled: AtomicBool::new(true),
            source: Some(source),
        })
    }

    /// Create an audio track
    pub fn audio(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind: TrackKind::Audio,
            enabled: AtomicBool::new(true),
            source: None,
        })
    }

    /// Track id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Video source feeding this track, if any
    pub fn source(&self) -> Option<&Arc<VideoTrackSource>> {
        self.source.as_ref()
    }

    /// Whether the track is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the track; returns true if the state changed
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel) != enabled
    }
}

/// Callback receiving the frames of a local video track
pub type FrameCallback = Box<dyn Fn(&VideoFrame) + Send + Sync>;

/// Sink registered on the source on behalf of a [`LocalVideoTrack`]
///
/// Runs on media threads. It only reads the track's enabled flag and the
/// current callback.
struct FrameObserver {
    track: Arc<MediaStreamTrack>,
    callback: Mutex<Option<FrameCallback>>,
}

impl VideoSink for FrameObserver {
    fn on_frame(&self, frame: &VideoFrame) {
        let callback = self.callback.lock();
        let Some(callback) = callback.as_ref() else {
            return;
        };
        if self.track.is_enabled() {
            callback(frame);
        } else {
            callback(&frame.blacked_out());
        }
    }
}

/// Binding of a local video track to its sender and owning connection
pub struct LocalVideoTrack {
    track: Arc<MediaStreamTrack>,
    source: Arc<VideoTrackSource>,
    observer: Arc<FrameObserver>,
    sink_id: SinkId,
    sender: Mutex<Option<RtpSenderId>>,
    owner: Mutex<Option<ConnectionRef>>,
}

impl LocalVideoTrack {
    /// Bind `track` to `sender` on the connection behind `owner`
    ///
    /// Registers the frame observer on the source with rotation applied.
    pub(crate) fn attach(
        track: Arc<MediaStreamTrack>,
        source: Arc<VideoTrackSource>,
        sender: RtpSenderId,
        owner: ConnectionRef,
    ) -> Arc<Self> {
        let observer = Arc::new(FrameObserver {
            track: Arc::clone(&track),
            callback: Mutex::new(None),
        });
        let sink_id = SinkId::next();
        source.add_or_update_sink(
            sink_id,
            Arc::clone(&observer) as Arc<dyn VideoSink>,
            SinkWants {
                rotation_applied: true,
            },
        );

        info!(
            "Local video track {} attached to connection {} (sender {})",
            track.id(),
            owner.id(),
            sender
        );

        Arc::new(Self {
            track,
            source,
            observer,
            sink_id,
            sender: Mutex::new(Some(sender)),
            owner: Mutex::new(Some(owner)),
        })
    }

    /// Track name
    pub fn name(&self) -> &str {
        self.track.id()
    }

    /// Underlying track
    pub fn track(&self) -> &Arc<MediaStreamTrack> {
        &self.track
    }

    /// Source feeding this track
    pub fn source(&self) -> &Arc<VideoTrackSource> {
        &self.source
    }

    /// Enable or disable the track
    pub fn set_enabled(&self, enabled: bool) {
        if self.track.set_enabled(enabled) {
            debug!("Local video track {} enabled={}", self.track.id(), enabled);
        }
    }

    /// Whether the track is enabled
    pub fn is_enabled(&self) -> bool {
        self.track.is_enabled()
    }

    /// Install the callback receiving this track's frames
    pub fn set_frame_callback(&self, callback: FrameCallback) {
        *self.observer.callback.lock() = Some(callback);
    }

    /// Remove the frame callback
    pub fn clear_frame_callback(&self) {
        *self.observer.callback.lock() = None;
    }

    /// Sender transmitting this track, until detached
    pub fn sender(&self) -> Option<RtpSenderId> {
        *self.sender.lock()
    }

    /// Connection owning this track, until detached
    pub fn owner_id(&self) -> Option<ConnectionId> {
        self.owner.lock().as_ref().map(ConnectionRef::id)
    }

    /// Whether the binding is still attached to a connection
    pub fn is_attached(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Whether the frame observer is still registered on the source
    pub fn is_sink_registered(&self) -> bool {
        self.source.has_sink(self.sink_id)
    }

    /// Detach from the owning connection
    ///
    /// The first call revokes the frame sink, removes the sender from the
    /// connection and clears the back-reference, returning `Ok(true)`. Later
    /// calls do nothing and return `Ok(false)`.
    ///
    /// # Panics
    ///
    /// Panics if the back-reference is still set after detaching.
    pub fn detach(&self) -> Result<bool> {
        self.source.remove_sink(self.sink_id);

        let Some(owner) = self.owner.lock().take() else {
            return Ok(false);
        };
        let sender = self.sender.lock().take();

        let result = match owner.upgrade() {
            Some(connection) => {
                connection.forget_video_track(self);
                match sender {
                    Some(sender) => connection.engine().remove_track(sender),
                    None => Ok(()),
                }
            }
            None => {
                debug!(
                    "Connection {} already gone while detaching track {}",
                    owner.id(),
                    self.track.id()
                );
                Ok(())
            }
        };

        assert!(
            self.owner.lock().is_none(),
            "local video track {} still owned after detach",
            self.track.id()
        );

        info!(
            "Local video track {} detached from connection {}",
            self.track.id(),
            owner.id()
        );
        result.map(|()| true)
    }
}

impl Drop for LocalVideoTrack {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!(
                "Failed to remove sender while dropping track {}: {}",
                self.track.id(),
                e
            );
        }
    }
}

impl std::fmt::Debug for LocalVideoTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVideoTrack")
            .field("name", &self.track.id())
            .field("enabled", &self.is_enabled())
            .field("sender", &self.sender())
            .field("owner", &self.owner_id())
            .finish()
    }
}
