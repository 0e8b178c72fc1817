//! Offer/answer/ICE handshake state machine
//!
//! The coordinator is owned by the processing context. It applies inbound
//! messages to a [`NegotiationTarget`] and produces the outbound messages
//! that must be published in response.
//!
//! # ICE field order
//!
//! Candidates are sent as `(candidate, sdpMLineIndex, sdpMid)` but applied
//! as `add_ice_candidate(sdp_mid, sdp_mline_index, candidate)`. The two
//! orders differ on purpose: the wire order is shared with existing peers and
//! must not be "fixed" to match the apply call.

use crate::signaling::message::{IceCandidate, MessageKind, SignalingMessage};
use crate::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Which side of the SDP exchange a description is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    /// Session offer
    Offer,
    /// Session answer
    Answer,
}

/// Operations the coordinator drives on the owning connection
pub trait NegotiationTarget {
    /// Apply a remote offer or answer
    fn set_remote_description(&mut self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Create a local offer and install it as the local description
    fn create_offer(&mut self) -> Result<String>;

    /// Create a local answer to the applied remote offer and install it
    fn create_answer(&mut self) -> Result<String>;

    /// Apply a remote ICE candidate
    fn add_ice_candidate(&mut self, sdp_mid: &str, sdp_mline_index: u32, candidate: &str)
        -> Result<()>;
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing exchanged yet
    Idle,
    /// A local offer has been produced
    OfferSent,
    /// A local answer has been produced
    AnswerSent,
    /// The owning connection reported the session is established
    Connected,
}

/// Handshake state machine
#[derive(Debug)]
pub struct Coordinator {
    state: HandshakeState,
    ice_separator: String,
    remote_description_applied: bool,
    last_remote_offer: Option<String>,
    last_remote_answer: Option<String>,
    pending_candidates: Vec<IceCandidate>,
    applied_candidates: HashSet<IceCandidate>,
}

impl Coordinator {
    /// Create an idle coordinator that builds ICE composites with `ice_separator`
    pub fn new(ice_separator: impl Into<String>) -> Self {
        Self {
            state: HandshakeState::Idle,
            ice_separator: ice_separator.into(),
            remote_description_applied: false,
            last_remote_offer: None,
            last_remote_answer: None,
            pending_candidates: Vec::new(),
            applied_candidates: HashSet::new(),
        }
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Remote candidates waiting for a remote description
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Apply an inbound message and return the messages to publish in response
    ///
    /// An inbound offer is always answered, even if a local offer is
    /// outstanding. Simultaneous offers (glare) are not resolved here.
    pub fn handle_inbound(
        &mut self,
        message: &SignalingMessage,
        target: &mut dyn NegotiationTarget,
    ) -> Result<Vec<SignalingMessage>> {
        match message.kind {
            MessageKind::Offer => self.handle_offer(&message.payload, target),
            MessageKind::Answer => {
                self.handle_answer(&message.payload, target)?;
                Ok(Vec::new())
            }
            MessageKind::IceCandidate => {
                let candidate = message.parse_ice_candidate()?;
                self.handle_candidate(candidate, target)?;
                Ok(Vec::new())
            }
            MessageKind::Unknown => {
                debug!("Ignoring signaling message of unknown kind");
                Ok(Vec::new())
            }
        }
    }

    fn handle_offer(
        &mut self,
        sdp: &str,
        target: &mut dyn NegotiationTarget,
    ) -> Result<Vec<SignalingMessage>> {
        if self.last_remote_offer.as_deref() == Some(sdp) {
            debug!("Ignoring duplicate remote offer");
            return Ok(Vec::new());
        }

        if self.state == HandshakeState::OfferSent {
            warn!("Remote offer received while a local offer is outstanding; answering anyway");
        }

        debug!("Applying remote offer ({} bytes)", sdp.len());
        target.set_remote_description(SdpKind::Offer, sdp)?;
        self.remote_description_replaced(target);

        let answer = target.create_answer()?;
        self.last_remote_offer = Some(sdp.to_string());
        Ok(vec![self.local_answer(answer)])
    }

    fn handle_answer(&mut self, sdp: &str, target: &mut dyn NegotiationTarget) -> Result<()> {
        if self.last_remote_answer.as_deref() == Some(sdp) {
            debug!("Ignoring duplicate remote answer");
            return Ok(());
        }

        debug!("Applying remote answer ({} bytes)", sdp.len());
        target.set_remote_description(SdpKind::Answer, sdp)?;
        self.last_remote_answer = Some(sdp.to_string());
        self.remote_description_replaced(target);
        Ok(())
    }

    /// A new remote description is in place: candidates applied to the old
    /// one no longer count as duplicates, and buffered ones can go in
    fn remote_description_replaced(&mut self, target: &mut dyn NegotiationTarget) {
        self.applied_candidates.clear();
        self.remote_description_applied = true;
        self.flush_pending_candidates(target);
    }

    fn handle_candidate(
        &mut self,
        candidate: IceCandidate,
        target: &mut dyn NegotiationTarget,
    ) -> Result<()> {
        if self.applied_candidates.contains(&candidate)
            || self.pending_candidates.contains(&candidate)
        {
            debug!("Ignoring duplicate ICE candidate for mid {}", candidate.sdp_mid);
            return Ok(());
        }

        if !self.remote_description_applied {
            debug!(
                "Buffering ICE candidate for mid {} until a remote description is applied",
                candidate.sdp_mid
            );
            self.pending_candidates.push(candidate);
            return Ok(());
        }

        self.apply_candidate(candidate, target)
    }

    fn apply_candidate(
        &mut self,
        candidate: IceCandidate,
        target: &mut dyn NegotiationTarget,
    ) -> Result<()> {
        // Wire order is (candidate, index, mid); apply order is (mid, index, candidate)
        target.add_ice_candidate(
            &candidate.sdp_mid,
            candidate.sdp_mline_index,
            &candidate.candidate,
        )?;
        self.applied_candidates.insert(candidate);
        Ok(())
    }

    fn flush_pending_candidates(&mut self, target: &mut dyn NegotiationTarget) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.apply_candidate(candidate, target) {
                warn!("Failed to apply buffered ICE candidate: {}", e);
            }
        }
    }

    /// Build the message for a locally created offer
    pub fn local_offer(&mut self, sdp: impl Into<String>) -> SignalingMessage {
        self.state = HandshakeState::OfferSent;
        SignalingMessage::offer(sdp)
    }

    /// Build the message for a locally created answer
    pub fn local_answer(&mut self, sdp: impl Into<String>) -> SignalingMessage {
        self.state = HandshakeState::AnswerSent;
        SignalingMessage::answer(sdp)
    }

    /// Build the message for a locally gathered ICE candidate
    pub fn local_ice_candidate(&self, candidate: &IceCandidate) -> Result<SignalingMessage> {
        SignalingMessage::ice_candidate(candidate, &self.ice_separator)
    }

    /// Ask the connection for an offer and build the message to publish
    ///
    /// Starts a new round: the next remote answer is applied even if its SDP
    /// matches the previous one.
    pub fn start_offer(&mut self, target: &mut dyn NegotiationTarget) -> Result<SignalingMessage> {
        let sdp = target.create_offer()?;
        self.last_remote_answer = None;
        Ok(self.local_offer(sdp))
    }

    /// Record that the owning connection is established
    pub fn on_connected(&mut self) {
        if self.state != HandshakeState::Connected {
            info!("Signaling handshake complete");
            self.state = HandshakeState::Connected;
        }
    }
}
