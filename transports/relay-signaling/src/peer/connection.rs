//! Peer connection owning local tracks
//!
//! [`PeerConnection`] is the owner side of the track lifecycle: it creates
//! senders through its [`RtcEngine`], hands out [`LocalVideoTrack`] bindings
//! and detaches every binding when it closes. Data channels are created and
//! removed through the same engine. It is also the
//! [`NegotiationTarget`] driven by the signaling coordinator.

use crate::media::{LocalVideoTrack, MediaStreamTrack, TrackKind, VideoTrackSource};
use crate::peer::data_channel::{DataChannelConfig, DataChannelId, DataChannelInfo};
use crate::peer::engine::{EngineObserver, RtcEngine, RtpSenderId};
use crate::peer::registry::{ConnectionId, ConnectionRef, ConnectionRegistry};
use crate::signaling::{IceCandidate, NegotiationTarget, SdpKind};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream id shared by all local tracks of a connection
pub const LOCAL_STREAM_ID: &str = "local_av_stream";

struct LocalAudioTrack {
    track: Arc<MediaStreamTrack>,
    sender: RtpSenderId,
}

/// Connection state reachable through the registry
pub(crate) struct ConnectionInner {
    id: ConnectionId,
    engine: Arc<dyn RtcEngine>,
    video_tracks: Mutex<Vec<Arc<LocalVideoTrack>>>,
    audio_track: Mutex<Option<LocalAudioTrack>>,
}

impl ConnectionInner {
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn engine(&self) -> &Arc<dyn RtcEngine> {
        &self.engine
    }

    /// Drop the connection's handle on `track`, if it still holds one
    pub(crate) fn forget_video_track(&self, track: &LocalVideoTrack) {
        let removed = {
            let mut tracks = self.video_tracks.lock();
            tracks
                .iter()
                .position(|t| std::ptr::eq(Arc::as_ptr(t), track))
                .map(|index| tracks.swap_remove(index))
        };
        // Released outside the lock
        drop(removed);
    }

    fn owns_video_track(&self, track: &LocalVideoTrack) -> bool {
        self.video_tracks
            .lock()
            .iter()
            .any(|t| std::ptr::eq(Arc::as_ptr(t), track))
    }
}

/// A peer connection with locally managed tracks
pub struct PeerConnection {
    inner: Arc<ConnectionInner>,
    registry: Arc<ConnectionRegistry>,
    closed: bool,
}

impl PeerConnection {
    /// Create a connection backed by `engine` and register it
    pub fn new(registry: &Arc<ConnectionRegistry>, engine: Arc<dyn RtcEngine>) -> Self {
        let inner = Arc::new(ConnectionInner {
            id: ConnectionId::new(),
            engine,
            video_tracks: Mutex::new(Vec::new()),
            audio_track: Mutex::new(None),
        });
        registry.register(Arc::clone(&inner));

        info!("Peer connection {} created", inner.id);

        Self {
            inner,
            registry: Arc::clone(registry),
            closed: false,
        }
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Engine backing this connection
    pub fn engine(&self) -> &Arc<dyn RtcEngine> {
        &self.inner.engine
    }

    /// Forward engine events to `observer`
    pub fn set_observer(&self, observer: Arc<dyn EngineObserver>) {
        self.inner.engine.set_observer(observer);
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::PeerConnectionError(format!(
                "connection {} is closed",
                self.inner.id
            )));
        }
        Ok(())
    }

    /// Add a local video track fed by `source`
    pub fn add_local_video_track(
        &self,
        name: &str,
        source: Arc<VideoTrackSource>,
    ) -> Result<Arc<LocalVideoTrack>> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(Error::MediaTrackError(
                "video track name cannot be empty".to_string(),
            ));
        }

        let sender = self
            .inner
            .engine
            .add_track(TrackKind::Video, name, LOCAL_STREAM_ID)?;
        let track = MediaStreamTrack::video(name, Arc::clone(&source));
        let binding = LocalVideoTrack::attach(
            track,
            source,
            sender,
            ConnectionRef::new(&self.registry, self.inner.id),
        );

        self.inner.video_tracks.lock().push(Arc::clone(&binding));
        Ok(binding)
    }

    /// Remove a local video track added by this connection
    ///
    /// Fails with [`Error::TrackNotFound`] if this connection does not own
    /// the track, including when it was already removed.
    pub fn remove_local_video_track(&self, track: &LocalVideoTrack) -> Result<()> {
        if track.owner_id() != Some(self.inner.id) || !self.inner.owns_video_track(track) {
            return Err(Error::TrackNotFound(track.name().to_string()));
        }
        track.detach()?;
        Ok(())
    }

    /// Remove every local video track fed by `source`, returning how many were removed
    pub fn remove_local_video_tracks_from_source(
        &self,
        source: &Arc<VideoTrackSource>,
    ) -> Result<usize> {
        let matching: Vec<Arc<LocalVideoTrack>> = self
            .inner
            .video_tracks
            .lock()
            .iter()
            .filter(|t| Arc::ptr_eq(t.source(), source))
            .cloned()
            .collect();

        let mut removed = 0;
        for track in matching {
            if track.detach()? {
                removed += 1;
            }
        }
        debug!(
            "Removed {} local video tracks fed by {}",
            removed,
            source.name()
        );
        Ok(removed)
    }

    /// Local video tracks currently attached
    pub fn local_video_tracks(&self) -> Vec<Arc<LocalVideoTrack>> {
        self.inner.video_tracks.lock().clone()
    }

    /// Add the local audio track; a connection has at most one
    pub fn add_local_audio_track(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut audio = self.inner.audio_track.lock();
        if audio.is_some() {
            return Err(Error::MediaTrackError(
                "connection already has a local audio track".to_string(),
            ));
        }

        let sender = self
            .inner
            .engine
            .add_track(TrackKind::Audio, name, LOCAL_STREAM_ID)?;
        *audio = Some(LocalAudioTrack {
            track: MediaStreamTrack::audio(name),
            sender,
        });
        info!("Local audio track {} added to {}", name, self.inner.id);
        Ok(())
    }

    /// Enable or disable the local audio track
    pub fn set_local_audio_track_enabled(&self, enabled: bool) -> Result<()> {
        let audio = self.inner.audio_track.lock();
        let audio = audio
            .as_ref()
            .ok_or_else(|| Error::TrackNotFound("local audio track".to_string()))?;
        audio.track.set_enabled(enabled);
        Ok(())
    }

    /// Whether a local audio track exists and is enabled
    pub fn is_local_audio_track_enabled(&self) -> bool {
        self.inner
            .audio_track
            .lock()
            .as_ref()
            .is_some_and(|audio| audio.track.is_enabled())
    }

    /// Whether a local audio track exists
    pub fn has_local_audio_track(&self) -> bool {
        self.inner.audio_track.lock().is_some()
    }

    /// Remove the local audio track, if any
    pub fn remove_local_audio_track(&self) -> Result<()> {
        let Some(audio) = self.inner.audio_track.lock().take() else {
            return Ok(());
        };
        info!(
            "Removing local audio track {} from {}",
            audio.track.id(),
            self.inner.id
        );
        self.inner.engine.remove_track(audio.sender)
    }

    /// Open a data channel
    pub fn add_data_channel(&self, config: &DataChannelConfig) -> Result<DataChannelInfo> {
        self.ensure_open()?;
        if config.label.is_empty() {
            return Err(Error::DataChannelError(
                "data channel label cannot be empty".to_string(),
            ));
        }
        let channel = self.inner.engine.add_data_channel(config)?;
        info!(
            "Data channel {} ({}) added to {}",
            channel.label, channel.id, self.inner.id
        );
        Ok(channel)
    }

    /// Close a data channel
    pub fn remove_data_channel(&self, id: DataChannelId) -> Result<()> {
        self.ensure_open()?;
        self.inner.engine.remove_data_channel(id)
    }

    /// Send a binary message on a data channel
    pub fn send_data(&self, id: DataChannelId, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.inner.engine.send_data(id, data)
    }

    /// Data channels currently known to the engine
    pub fn data_channels(&self) -> Vec<DataChannelInfo> {
        self.inner.engine.data_channels()
    }

    /// Detach all local tracks, close the engine and leave the registry
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing peer connection {}", self.inner.id);

        let tracks = std::mem::take(&mut *self.inner.video_tracks.lock());
        for track in &tracks {
            if let Err(e) = track.detach() {
                warn!("Failed to detach track {}: {}", track.name(), e);
            }
        }
        drop(tracks);

        if let Err(e) = self.remove_local_audio_track() {
            warn!("Failed to remove local audio track: {}", e);
        }

        for channel in self.inner.engine.data_channels() {
            if let Err(e) = self.inner.engine.remove_data_channel(channel.id) {
                warn!("Failed to remove data channel {}: {}", channel.label, e);
            }
        }

        let result = self.inner.engine.close();
        self.registry.unregister(self.inner.id);
        result
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing peer connection {}: {}", self.inner.id, e);
        }
    }
}

impl NegotiationTarget for PeerConnection {
    fn set_remote_description(&mut self, kind: SdpKind, sdp: &str) -> Result<()> {
        self.ensure_open()?;
        self.inner.engine.set_remote_description(kind, sdp)
    }

    fn create_offer(&mut self) -> Result<String> {
        self.ensure_open()?;
        self.inner.engine.create_offer()
    }

    fn create_answer(&mut self) -> Result<String> {
        self.ensure_open()?;
        self.inner.engine.create_answer()
    }

    fn add_ice_candidate(
        &mut self,
        sdp_mid: &str,
        sdp_mline_index: u32,
        candidate: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        self.inner.engine.add_ice_candidate(&IceCandidate {
            candidate: candidate.to_string(),
            sdp_mline_index,
            sdp_mid: sdp_mid.to_string(),
        })
    }
}
