//! webrtc-rs backed engine
//!
//! Engine calls are synchronous: each one blocks the processing context on
//! the tokio runtime until webrtc-rs finishes. The processing context must
//! therefore be a plain thread, or a worker of a multi-threaded runtime.

use crate::config::RelaySignalingConfig;
use crate::media::TrackKind;
use crate::peer::data_channel::{DataChannelConfig, DataChannelId, DataChannelInfo, DataChannelState};
use crate::peer::engine::{EngineObserver, IceConnectionState, RtcEngine, RtpSenderId};
use crate::signaling::{IceCandidate, SdpKind};
use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

type ObserverSlot = Arc<RwLock<Option<Arc<dyn EngineObserver>>>>;
type ChannelMap = Arc<Mutex<HashMap<DataChannelId, (DataChannelInfo, Arc<RTCDataChannel>)>>>;

/// [`RtcEngine`] over a webrtc-rs `RTCPeerConnection`
pub struct WebRtcEngine {
    runtime: Handle,
    peer_connection: Arc<RTCPeerConnection>,
    observer: ObserverSlot,
    senders: Mutex<HashMap<RtpSenderId, Arc<RTCRtpSender>>>,
    channels: ChannelMap,
}

impl WebRtcEngine {
    /// Build the engine, blocking on `runtime`
    pub fn new(runtime: Handle, config: &RelaySignalingConfig) -> Result<Self> {
        let stun_servers = config.stun_servers.clone();
        let peer_connection = block_on(&runtime, create_peer_connection(stun_servers))?;
        Ok(Self::from_peer_connection(runtime, peer_connection))
    }

    /// Wrap an existing connection and install the event callbacks
    pub fn from_peer_connection(runtime: Handle, peer_connection: Arc<RTCPeerConnection>) -> Self {
        let observer: ObserverSlot = Arc::new(RwLock::new(None));
        let channels: ChannelMap = Arc::new(Mutex::new(HashMap::new()));
        install_callbacks(&peer_connection, &observer, &channels);

        Self {
            runtime,
            peer_connection,
            observer,
            senders: Mutex::new(HashMap::new()),
            channels,
        }
    }

    /// Underlying webrtc-rs connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        block_on(&self.runtime, future)
    }

    async fn local_sdp(&self) -> Result<String> {
        self.peer_connection
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| Error::SdpError("no local description after setting it".to_string()))
    }
}

fn block_on<F: Future>(runtime: &Handle, future: F) -> F::Output {
    if Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| runtime.block_on(future))
    } else {
        runtime.block_on(future)
    }
}

#[instrument(skip_all, fields(stun_servers = stun_servers.len()))]
async fn create_peer_connection(stun_servers: Vec<String>) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

    let interceptor_registry =
        register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
            Error::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(interceptor_registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: stun_servers,
            ..Default::default()
        }],
        ..Default::default()
    };

    let peer_connection = api
        .new_peer_connection(rtc_config)
        .await
        .map_err(|e| Error::WebRtcError(format!("Failed to create peer connection: {}", e)))?;

    info!("WebRTC peer connection created");
    Ok(Arc::new(peer_connection))
}

fn current_observer(slot: &ObserverSlot) -> Option<Arc<dyn EngineObserver>> {
    slot.read().clone()
}

fn ice_connection_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn track_kind(kind: RTPCodecType) -> Option<TrackKind> {
    match kind {
        RTPCodecType::Audio => Some(TrackKind::Audio),
        RTPCodecType::Video => Some(TrackKind::Video),
        _ => None,
    }
}

/// Track `channel` in `channels`, wire its events to the observer and
/// announce it
fn register_channel(
    channel: Arc<RTCDataChannel>,
    negotiated_id: Option<u16>,
    slot: &ObserverSlot,
    channels: &ChannelMap,
) -> DataChannelInfo {
    let info = DataChannelInfo {
        id: DataChannelId::next(),
        label: channel.label().to_string(),
        negotiated_id,
    };
    let id = info.id;

    let open_slot = Arc::clone(slot);
    channel.on_open(Box::new(move || {
        Box::pin(async move {
            debug!("Data channel {} open", id);
            if let Some(observer) = current_observer(&open_slot) {
                observer.on_data_channel_state_change(id, DataChannelState::Open);
            }
        })
    }));

    let close_slot = Arc::clone(slot);
    let close_channels = Arc::clone(channels);
    channel.on_close(Box::new(move || {
        let slot = Arc::clone(&close_slot);
        let channels = Arc::clone(&close_channels);
        Box::pin(async move {
            debug!("Data channel {} closed", id);
            let observer = current_observer(&slot);
            if let Some(observer) = &observer {
                observer.on_data_channel_state_change(id, DataChannelState::Closed);
            }
            // Closed by the remote side; local removals already left the map
            let removed = channels.lock().remove(&id);
            if let (Some((info, _)), Some(observer)) = (removed, observer) {
                observer.on_data_channel_removed(&info);
            }
        })
    }));

    let message_slot = Arc::clone(slot);
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let slot = Arc::clone(&message_slot);
        Box::pin(async move {
            if let Some(observer) = current_observer(&slot) {
                observer.on_data_channel_message(id, message.data);
            }
        })
    }));

    channels.lock().insert(id, (info.clone(), channel));
    if let Some(observer) = current_observer(slot) {
        observer.on_data_channel_added(&info);
    }
    info
}

fn install_callbacks(
    peer_connection: &RTCPeerConnection,
    observer: &ObserverSlot,
    channels: &ChannelMap,
) {
    let slot = Arc::clone(observer);
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            // None marks the end of gathering
            let Some(candidate) = candidate else {
                debug!("ICE gathering complete");
                return;
            };
            let init = match candidate.to_json() {
                Ok(init) => init,
                Err(e) => {
                    warn!("Failed to serialize local ICE candidate: {}", e);
                    return;
                }
            };
            if let Some(observer) = current_observer(&slot) {
                observer.on_ice_candidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mline_index: u32::from(init.sdp_mline_index.unwrap_or(0)),
                    sdp_mid: init.sdp_mid.unwrap_or_default(),
                });
            }
        })
    }));

    let slot = Arc::clone(observer);
    peer_connection.on_negotiation_needed(Box::new(move || {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            debug!("Renegotiation needed");
            if let Some(observer) = current_observer(&slot) {
                observer.on_renegotiation_needed();
            }
        })
    }));

    let slot = Arc::clone(observer);
    peer_connection.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            debug!("Signaling state changed to {}", state);
            if state == RTCSignalingState::Stable {
                if let Some(observer) = current_observer(&slot) {
                    observer.on_connected();
                }
            }
        })
    }));

    let slot = Arc::clone(observer);
    peer_connection.on_ice_connection_state_change(Box::new(
        move |state: RTCIceConnectionState| {
            let slot = Arc::clone(&slot);
            Box::pin(async move {
                debug!("ICE connection state changed to {}", state);
                if let Some(observer) = current_observer(&slot) {
                    observer.on_ice_connection_state_change(ice_connection_state(state));
                }
            })
        },
    ));

    let slot = Arc::clone(observer);
    peer_connection.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let slot = Arc::clone(&slot);
            Box::pin(async move {
                let Some(kind) = track_kind(track.kind()) else {
                    warn!("Ignoring remote track {} of unknown kind", track.id());
                    return;
                };
                info!("Remote {:?} track {} added", kind, track.id());
                if let Some(observer) = current_observer(&slot) {
                    observer.on_remote_track_added(kind);
                }

                // The track is gone once reading from it fails
                tokio::spawn(async move {
                    while track.read_rtp().await.is_ok() {}
                    info!("Remote {:?} track {} removed", kind, track.id());
                    if let Some(observer) = current_observer(&slot) {
                        observer.on_remote_track_removed(kind);
                    }
                });
            })
        },
    ));

    let slot = Arc::clone(observer);
    let channel_map = Arc::clone(channels);
    peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let slot = Arc::clone(&slot);
        let channel_map = Arc::clone(&channel_map);
        Box::pin(async move {
            let info = register_channel(channel, None, &slot, &channel_map);
            info!("Remote data channel {} ({}) announced", info.label, info.id);
        })
    }));

    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Connected => info!("Peer connection established"),
                    RTCPeerConnectionState::Failed => warn!("Peer connection failed"),
                    other => debug!("Peer connection state: {}", other),
                }
            })
        },
    ));
}

impl RtcEngine for WebRtcEngine {
    fn set_observer(&self, observer: Arc<dyn EngineObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp.to_string()),
            SdpKind::Answer => RTCSessionDescription::answer(sdp.to_string()),
        }
        .map_err(|e| Error::SdpError(format!("Failed to parse {:?}: {}", kind, e)))?;

        self.block_on(self.peer_connection.set_remote_description(description))
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    fn create_offer(&self) -> Result<String> {
        self.block_on(async {
            let offer = self
                .peer_connection
                .create_offer(None)
                .await
                .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;
            self.peer_connection
                .set_local_description(offer)
                .await
                .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;
            self.local_sdp().await
        })
    }

    fn create_answer(&self) -> Result<String> {
        self.block_on(async {
            let answer = self
                .peer_connection
                .create_answer(None)
                .await
                .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
            self.peer_connection
                .set_local_description(answer)
                .await
                .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;
            self.local_sdp().await
        })
    }

    fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let sdp_mline_index = u16::try_from(candidate.sdp_mline_index).map_err(|_| {
            Error::IceCandidateError(format!(
                "sdpMLineIndex {} out of range",
                candidate.sdp_mline_index
            ))
        })?;

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: Some(candidate.sdp_mid.clone()),
            sdp_mline_index: Some(sdp_mline_index),
            username_fragment: None,
        };

        self.block_on(self.peer_connection.add_ice_candidate(init))
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    fn add_track(&self, kind: TrackKind, track_id: &str, stream_id: &str) -> Result<RtpSenderId> {
        let mime_type = match kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_string(),
                ..Default::default()
            },
            track_id.to_string(),
            stream_id.to_string(),
        ));

        let sender = self
            .block_on(
                self.peer_connection
                    .add_track(track as Arc<dyn TrackLocal + Send + Sync>),
            )
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track {}: {}", track_id, e)))?;

        let id = RtpSenderId::next();
        self.senders.lock().insert(id, sender);
        debug!("Added {:?} track {} as {}", kind, track_id, id);
        Ok(id)
    }

    fn remove_track(&self, sender: RtpSenderId) -> Result<()> {
        let rtp_sender = self
            .senders
            .lock()
            .remove(&sender)
            .ok_or_else(|| Error::TrackNotFound(sender.to_string()))?;

        self.block_on(self.peer_connection.remove_track(&rtp_sender))
            .map_err(|e| Error::MediaTrackError(format!("Failed to remove {}: {}", sender, e)))
    }

    fn add_data_channel(&self, config: &DataChannelConfig) -> Result<DataChannelInfo> {
        let init = RTCDataChannelInit {
            ordered: Some(config.ordered),
            max_retransmits: (!config.reliable).then_some(0),
            negotiated: config.negotiated_id,
            ..Default::default()
        };
        let channel = self
            .block_on(
                self.peer_connection
                    .create_data_channel(&config.label, Some(init)),
            )
            .map_err(|e| {
                Error::DataChannelError(format!(
                    "Failed to create data channel {}: {}",
                    config.label, e
                ))
            })?;

        Ok(register_channel(
            channel,
            config.negotiated_id,
            &self.observer,
            &self.channels,
        ))
    }

    fn remove_data_channel(&self, id: DataChannelId) -> Result<()> {
        let (info, channel) = self
            .channels
            .lock()
            .remove(&id)
            .ok_or_else(|| Error::DataChannelError(format!("unknown data channel {}", id)))?;

        if let Some(observer) = current_observer(&self.observer) {
            observer.on_data_channel_state_change(id, DataChannelState::Closing);
        }
        let result = self
            .block_on(channel.close())
            .map_err(|e| Error::DataChannelError(format!("Failed to close {}: {}", info.label, e)));
        if let Some(observer) = current_observer(&self.observer) {
            observer.on_data_channel_removed(&info);
        }
        result
    }

    fn send_data(&self, id: DataChannelId, data: &[u8]) -> Result<()> {
        let channel = self
            .channels
            .lock()
            .get(&id)
            .map(|(_, channel)| Arc::clone(channel))
            .ok_or_else(|| Error::DataChannelError(format!("unknown data channel {}", id)))?;

        self.block_on(channel.send(&Bytes::copy_from_slice(data)))
            .map(|_| ())
            .map_err(|e| Error::DataChannelError(format!("Failed to send on {}: {}", id, e)))
    }

    fn data_channels(&self) -> Vec<DataChannelInfo> {
        self.channels
            .lock()
            .values()
            .map(|(info, _)| info.clone())
            .collect()
    }

    fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        self.channels.lock().clear();
        self.block_on(self.peer_connection.close())
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }
}
