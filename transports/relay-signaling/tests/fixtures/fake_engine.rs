//! In-memory media engine
//!
//! Behaves like a WebRTC engine for signaling purposes: offers and answers
//! are labelled strings, each local description "gathers" one ICE candidate,
//! and applying the final description reports the connection as established.
//! Remote-side events are raised explicitly by the test.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use remotemedia_relay_signaling::media::TrackKind;
use remotemedia_relay_signaling::{
    DataChannelConfig, DataChannelId, DataChannelInfo, DataChannelState, EngineObserver, Error,
    IceCandidate, IceConnectionState, Result, RtcEngine, RtpSenderId, SdpKind,
};
use std::collections::HashMap;
use std::sync::Arc;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    RemoteDescription(SdpKind, String),
    CreateOffer,
    CreateAnswer,
    IceCandidate(IceCandidate),
    AddTrack(TrackKind, String, String),
    RemoveTrack(RtpSenderId),
    AddDataChannel(DataChannelConfig),
    RemoveDataChannel(DataChannelId),
    SendData(DataChannelId, Vec<u8>),
    Close,
}

pub struct FakeEngine {
    name: String,
    observer: RwLock<Option<Arc<dyn EngineObserver>>>,
    calls: Mutex<Vec<EngineCall>>,
    senders: Mutex<HashMap<RtpSenderId, String>>,
    channels: Mutex<HashMap<DataChannelId, DataChannelInfo>>,
}

impl FakeEngine {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            observer: RwLock::new(None),
            calls: Mutex::new(Vec::new()),
            senders: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Offer SDP this engine produces
    pub fn offer_sdp(&self) -> String {
        format!("offer-from-{}", self.name)
    }

    /// Answer SDP this engine produces
    pub fn answer_sdp(&self) -> String {
        format!("answer-from-{}", self.name)
    }

    /// Candidate this engine gathers
    pub fn local_candidate(&self) -> IceCandidate {
        IceCandidate::new(
            format!("candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host {}", self.name),
            0,
            "0",
        )
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::RemoteDescription(kind, sdp) => Some((*kind, sdp.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::IceCandidate(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn removed_senders(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, EngineCall::RemoveTrack(_)))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.calls.lock().contains(&EngineCall::Close)
    }

    /// Payloads sent on `id`
    pub fn sent_data(&self, id: DataChannelId) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::SendData(channel, data) if *channel == id => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Report an ICE transport state
    pub fn set_ice_state(&self, state: IceConnectionState) {
        if let Some(observer) = self.observer() {
            observer.on_ice_connection_state_change(state);
        }
    }

    /// Simulate the remote peer starting a track
    pub fn remote_track_added(&self, kind: TrackKind) {
        if let Some(observer) = self.observer() {
            observer.on_remote_track_added(kind);
        }
    }

    /// Simulate a remote track ending
    pub fn remote_track_removed(&self, kind: TrackKind) {
        if let Some(observer) = self.observer() {
            observer.on_remote_track_removed(kind);
        }
    }

    /// Simulate the remote peer announcing a data channel, which opens at once
    pub fn remote_data_channel(&self, label: &str) -> DataChannelInfo {
        let channel = DataChannelInfo {
            id: DataChannelId::next(),
            label: label.to_string(),
            negotiated_id: None,
        };
        self.channels.lock().insert(channel.id, channel.clone());
        if let Some(observer) = self.observer() {
            observer.on_data_channel_added(&channel);
            observer.on_data_channel_state_change(channel.id, DataChannelState::Open);
        }
        channel
    }

    /// Simulate a message from the remote peer
    pub fn deliver_data(&self, id: DataChannelId, data: &[u8]) {
        if let Some(observer) = self.observer() {
            observer.on_data_channel_message(id, Bytes::copy_from_slice(data));
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    fn observer(&self) -> Option<Arc<dyn EngineObserver>> {
        self.observer.read().clone()
    }

    fn gather(&self) {
        if let Some(observer) = self.observer() {
            observer.on_ice_candidate(self.local_candidate());
        }
    }
}

impl RtcEngine for FakeEngine {
    fn set_observer(&self, observer: Arc<dyn EngineObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        if sdp.is_empty() {
            return Err(Error::SdpError("empty description".to_string()));
        }
        self.record(EngineCall::RemoteDescription(kind, sdp.to_string()));
        if kind == SdpKind::Answer {
            if let Some(observer) = self.observer() {
                observer.on_connected();
            }
        }
        Ok(())
    }

    fn create_offer(&self) -> Result<String> {
        self.record(EngineCall::CreateOffer);
        self.gather();
        Ok(self.offer_sdp())
    }

    fn create_answer(&self) -> Result<String> {
        self.record(EngineCall::CreateAnswer);
        self.gather();
        if let Some(observer) = self.observer() {
            observer.on_connected();
        }
        Ok(self.answer_sdp())
    }

    fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.record(EngineCall::IceCandidate(candidate.clone()));
        Ok(())
    }

    fn add_track(&self, kind: TrackKind, track_id: &str, stream_id: &str) -> Result<RtpSenderId> {
        self.record(EngineCall::AddTrack(
            kind,
            track_id.to_string(),
            stream_id.to_string(),
        ));
        let sender = RtpSenderId::next();
        self.senders.lock().insert(sender, track_id.to_string());
        Ok(sender)
    }

    fn remove_track(&self, sender: RtpSenderId) -> Result<()> {
        if self.senders.lock().remove(&sender).is_none() {
            return Err(Error::TrackNotFound(sender.to_string()));
        }
        self.record(EngineCall::RemoveTrack(sender));
        Ok(())
    }

    fn add_data_channel(&self, config: &DataChannelConfig) -> Result<DataChannelInfo> {
        self.record(EngineCall::AddDataChannel(config.clone()));
        let channel = DataChannelInfo {
            id: DataChannelId::next(),
            label: config.label.clone(),
            negotiated_id: config.negotiated_id,
        };
        self.channels.lock().insert(channel.id, channel.clone());
        if let Some(observer) = self.observer() {
            observer.on_data_channel_added(&channel);
        }
        Ok(channel)
    }

    fn remove_data_channel(&self, id: DataChannelId) -> Result<()> {
        let channel = self
            .channels
            .lock()
            .remove(&id)
            .ok_or_else(|| Error::DataChannelError(format!("unknown data channel {}", id)))?;
        self.record(EngineCall::RemoveDataChannel(id));
        if let Some(observer) = self.observer() {
            observer.on_data_channel_state_change(id, DataChannelState::Closed);
            observer.on_data_channel_removed(&channel);
        }
        Ok(())
    }

    fn send_data(&self, id: DataChannelId, data: &[u8]) -> Result<()> {
        if !self.channels.lock().contains_key(&id) {
            return Err(Error::DataChannelError(format!("unknown data channel {}", id)));
        }
        self.record(EngineCall::SendData(id, data.to_vec()));
        Ok(())
    }

    fn data_channels(&self) -> Vec<DataChannelInfo> {
        self.channels.lock().values().cloned().collect()
    }

    fn close(&self) -> Result<()> {
        self.record(EngineCall::Close);
        Ok(())
    }
}
