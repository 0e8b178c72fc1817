//! Relay signaler: the processing-context driver
//!
//! [`RelaySignaler`] owns the handshake state, the poll scheduler and the
//! connection being negotiated. It must be driven from a single thread by
//! calling [`RelaySignaler::update`]. Relay I/O runs on tokio tasks whose
//! results come back through the dispatch queue, so no handshake state is
//! ever touched off the processing context.
//!
//! [`SignalerHandle`] is the thread-safe front door used by engine callbacks
//! and other threads.

use crate::config::{PeerIdentity, RelaySignalingConfig};
use crate::dispatch::DispatchQueue;
use crate::error::TransportError;
use crate::peer::{EngineObserver, IceConnectionState};
use crate::signaling::coordinator::{Coordinator, HandshakeState, NegotiationTarget};
use crate::signaling::message::{self, IceCandidate, MessageKind, SignalingMessage};
use crate::signaling::poll::PollScheduler;
use crate::signaling::relay::RelayClient;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// Completion resolved once a publish has finished
pub type SendCompletion = oneshot::Sender<Result<()>>;

/// Signaling driver owned by the processing context
pub struct RelaySignaler<P: NegotiationTarget + 'static> {
    config: RelaySignalingConfig,
    identity: PeerIdentity,
    coordinator: Coordinator,
    poll: PollScheduler,
    relay: Arc<dyn RelayClient>,
    runtime: Handle,
    queue: Arc<DispatchQueue<RelaySignaler<P>>>,
    peer: P,
    deferred_offer: Option<SignalingMessage>,
    ice_state: IceConnectionState,
    shutting_down: bool,
}

impl<P: NegotiationTarget + 'static> RelaySignaler<P> {
    /// Create a signaler for `peer`, publishing and polling through `relay`
    ///
    /// `runtime` is where relay requests are spawned. The signaler itself
    /// does not need to run on a runtime thread.
    pub fn new(
        config: RelaySignalingConfig,
        relay: Arc<dyn RelayClient>,
        runtime: Handle,
        peer: P,
    ) -> Result<Self> {
        config.validate()?;

        let identity = PeerIdentity::from_config(&config);
        info!(
            "Relay signaler created: local_id={}, remote_id={}, polling={}",
            identity.local_id(),
            identity.remote_id(),
            config.polling_enabled
        );

        Ok(Self {
            coordinator: Coordinator::new(config.ice_data_separator.clone()),
            poll: PollScheduler::new(config.poll_interval_ms, config.polling_enabled),
            identity,
            config,
            relay,
            runtime,
            queue: Arc::new(DispatchQueue::new()),
            peer,
            deferred_offer: None,
            ice_state: IceConnectionState::New,
            shutting_down: false,
        })
    }

    /// Thread-safe handle feeding this signaler's dispatch queue
    pub fn handle(&self) -> SignalerHandle<P> {
        SignalerHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// One processing step: run queued work, then advance the poll timer
    pub fn update(&mut self, delta_ms: f64) {
        self.drain();
        if self.shutting_down {
            return;
        }
        if self.poll.tick(delta_ms) {
            self.issue_poll();
        }
    }

    /// Run queued work without advancing time
    pub fn drain(&mut self) -> usize {
        let queue = Arc::clone(&self.queue);
        queue.drain_and_execute(self)
    }

    /// Poll the relay now unless a poll is already outstanding
    pub fn poll_now(&mut self) -> bool {
        if self.shutting_down || !self.poll.poll_now() {
            return false;
        }
        self.issue_poll();
        true
    }

    fn issue_poll(&mut self) {
        let relay = Arc::clone(&self.relay);
        let queue = Arc::clone(&self.queue);
        let local_id = self.identity.local_id().to_string();

        trace!("Polling relay for {}", local_id);
        self.runtime.spawn(async move {
            let result = relay.receive(&local_id).await;
            queue.enqueue(move |signaler: &mut RelaySignaler<P>| signaler.on_poll_complete(result));
        });
    }

    fn on_poll_complete(&mut self, result: std::result::Result<Option<Bytes>, TransportError>) {
        self.poll.complete();

        if self.shutting_down {
            debug!("Discarding relay poll result after shutdown");
            return;
        }

        match result {
            Ok(None) => trace!("No signaling data waiting"),
            Ok(Some(bytes)) => self.handle_payload(&bytes),
            Err(e) => debug!("Relay poll failed, retrying on a later tick: {}", e),
        }
    }

    fn handle_payload(&mut self, bytes: &[u8]) {
        let message = match message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed signaling message: {}", e);
                return;
            }
        };

        debug!(
            "Received {} message from relay ({} bytes)",
            message.kind.as_wire_str(),
            message.payload.len()
        );

        // An offer we could not answer stays unapplied
        if message.kind == MessageKind::Offer {
            if let Err(e) = self.identity.send_target() {
                warn!("Holding remote offer until a remote peer is set: {}", e);
                self.deferred_offer = Some(message);
                return;
            }
        }

        self.apply_inbound(message);
    }

    fn apply_inbound(&mut self, message: SignalingMessage) {
        match self.coordinator.handle_inbound(&message, &mut self.peer) {
            Ok(outbound) => {
                for reply in outbound {
                    self.dispatch(reply, None);
                }
            }
            Err(e) => warn!(
                "Failed to apply {} message: {}",
                message.kind.as_wire_str(),
                e
            ),
        }
    }

    /// Publish a message to the remote peer
    ///
    /// Fails with a configuration error, without touching the relay, when no
    /// remote peer id is set.
    pub fn send_message(&mut self, message: SignalingMessage) -> Result<()> {
        self.identity.send_target()?;
        self.dispatch(message, None);
        Ok(())
    }

    /// Publish a message and resolve `completion` with the outcome
    pub fn dispatch(&mut self, message: SignalingMessage, completion: Option<SendCompletion>) {
        if self.shutting_down {
            resolve(completion, Err(Error::Shutdown));
            return;
        }

        let target = match self.identity.send_target() {
            Ok(target) => target.to_string(),
            Err(e) => {
                warn!(
                    "Not sending {} message: {}",
                    message.kind.as_wire_str(),
                    e
                );
                resolve(completion, Err(e));
                return;
            }
        };

        let kind = message.kind;
        let payload = Bytes::from(message::encode(&message));
        let relay = Arc::clone(&self.relay);
        let queue = Arc::clone(&self.queue);

        debug!(
            "Publishing {} message to {} ({} bytes)",
            kind.as_wire_str(),
            target,
            payload.len()
        );
        self.runtime.spawn(async move {
            let result = relay.send(&target, payload).await;
            queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
                signaler.on_send_complete(kind, result, completion)
            });
        });
    }

    fn on_send_complete(
        &mut self,
        kind: MessageKind,
        result: std::result::Result<(), TransportError>,
        completion: Option<SendCompletion>,
    ) {
        match &result {
            Ok(()) => debug!("Published {} message", kind.as_wire_str()),
            Err(e) => warn!("Failed to publish {} message: {}", kind.as_wire_str(), e),
        }
        resolve(completion, result.map_err(Error::from));
    }

    /// Publish a locally created offer
    pub fn on_local_offer_ready(&mut self, sdp: String) -> Result<()> {
        self.identity.send_target()?;
        let message = self.coordinator.local_offer(sdp);
        self.dispatch(message, None);
        Ok(())
    }

    /// Publish a locally created answer
    pub fn on_local_answer_ready(&mut self, sdp: String) -> Result<()> {
        self.identity.send_target()?;
        let message = self.coordinator.local_answer(sdp);
        self.dispatch(message, None);
        Ok(())
    }

    /// Publish a locally gathered ICE candidate
    pub fn on_local_ice_candidate_ready(
        &mut self,
        candidate: String,
        sdp_mline_index: u32,
        sdp_mid: String,
    ) -> Result<()> {
        self.identity.send_target()?;
        let message = self.coordinator.local_ice_candidate(&IceCandidate {
            candidate,
            sdp_mline_index,
            sdp_mid,
        })?;
        self.dispatch(message, None);
        Ok(())
    }

    /// Create an offer on the connection and publish it
    pub fn start_offer(&mut self) -> Result<()> {
        self.identity.send_target()?;
        let message = self.coordinator.start_offer(&mut self.peer)?;
        info!("Sending offer to {}", self.identity.remote_id());
        self.dispatch(message, None);
        Ok(())
    }

    /// The connection needs a new offer/answer round
    pub fn on_renegotiation_needed(&mut self) {
        if !self.config.auto_renegotiate {
            debug!("Renegotiation needed; automatic renegotiation is off");
            return;
        }
        if let Err(e) = self.start_offer() {
            warn!("Automatic renegotiation failed: {}", e);
        }
    }

    /// The connection reports the session is established
    pub fn on_connected(&mut self) {
        self.coordinator.on_connected();
    }

    /// The ICE transport changed state
    pub fn on_ice_connection_state_change(&mut self, state: IceConnectionState) {
        if state == self.ice_state {
            return;
        }
        match state {
            IceConnectionState::Failed => warn!("ICE connection failed"),
            IceConnectionState::Disconnected => warn!("ICE connection lost"),
            other => info!("ICE connection state: {:?}", other),
        }
        self.ice_state = state;
    }

    /// Last reported ICE transport state
    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_state
    }

    /// Change the peer messages are published to
    pub fn set_remote_peer_id(&mut self, remote_id: impl Into<String>) {
        self.identity.set_remote_id(remote_id);
        info!("Remote peer set to {}", self.identity.remote_id());

        if self.shutting_down || self.identity.send_target().is_err() {
            return;
        }
        if let Some(offer) = self.deferred_offer.take() {
            info!("Answering held remote offer");
            self.apply_inbound(offer);
        }
    }

    /// Whether a remote offer is waiting for a remote peer id
    pub fn has_deferred_offer(&self) -> bool {
        self.deferred_offer.is_some()
    }

    /// Local and remote relay keys
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Current handshake state
    pub fn handshake_state(&self) -> HandshakeState {
        self.coordinator.state()
    }

    /// Whether a relay receive is outstanding
    pub fn poll_in_flight(&self) -> bool {
        self.poll.in_flight()
    }

    /// Switch timer-driven polling on or off
    pub fn set_polling_enabled(&mut self, enabled: bool) {
        self.poll.set_enabled(enabled);
    }

    /// Connection being negotiated
    pub fn peer(&self) -> &P {
        &self.peer
    }

    /// Mutable access to the connection being negotiated
    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Stop polling and sending; outstanding poll results are discarded
    pub fn shutdown(&mut self) {
        if !self.shutting_down {
            info!("Relay signaler {} shutting down", self.identity.local_id());
            self.shutting_down = true;
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

impl<P: NegotiationTarget + 'static> Drop for RelaySignaler<P> {
    fn drop(&mut self) {
        // Pending calls resolve with Error::Shutdown
        self.queue.close();
    }
}

fn resolve(completion: Option<SendCompletion>, result: Result<()>) {
    if let Some(tx) = completion {
        let _ = tx.send(result);
    }
}

/// Thread-safe front door to a [`RelaySignaler`]
pub struct SignalerHandle<P: NegotiationTarget + 'static> {
    queue: Arc<DispatchQueue<RelaySignaler<P>>>,
}

impl<P: NegotiationTarget + 'static> Clone for SignalerHandle<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<P: NegotiationTarget + 'static> SignalerHandle<P> {
    /// Publish a message and block until the relay accepted or rejected it
    ///
    /// Must not be called from the processing context or a runtime thread.
    pub fn send_message_blocking(&self, message: SignalingMessage) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .enqueue(move |signaler: &mut RelaySignaler<P>| signaler.dispatch(message, Some(tx)));
        rx.blocking_recv().map_err(|_| Error::Shutdown)?
    }

    /// Publish a message and wait until the relay accepted or rejected it
    pub async fn send_message(&self, message: SignalingMessage) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .enqueue(move |signaler: &mut RelaySignaler<P>| signaler.dispatch(message, Some(tx)));
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Queue a locally created offer for publishing
    pub fn on_local_offer_ready(&self, sdp: String) {
        self.queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
            if let Err(e) = signaler.on_local_offer_ready(sdp) {
                warn!("Dropping local offer: {}", e);
            }
        });
    }

    /// Queue a locally created answer for publishing
    pub fn on_local_answer_ready(&self, sdp: String) {
        self.queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
            if let Err(e) = signaler.on_local_answer_ready(sdp) {
                warn!("Dropping local answer: {}", e);
            }
        });
    }

    /// Queue a locally gathered ICE candidate for publishing
    pub fn on_local_ice_candidate_ready(
        &self,
        candidate: String,
        sdp_mline_index: u32,
        sdp_mid: String,
    ) {
        self.queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
            if let Err(e) = signaler.on_local_ice_candidate_ready(candidate, sdp_mline_index, sdp_mid)
            {
                warn!("Dropping local ICE candidate: {}", e);
            }
        });
    }

    /// Queue an offer round
    pub fn start_offer(&self) {
        self.queue.enqueue(|signaler: &mut RelaySignaler<P>| {
            if let Err(e) = signaler.start_offer() {
                warn!("Failed to start offer: {}", e);
            }
        });
    }

    /// Queue an explicit poll
    pub fn poll_now(&self) {
        self.queue.enqueue(|signaler: &mut RelaySignaler<P>| {
            signaler.poll_now();
        });
    }

    /// Queue a change of remote peer
    pub fn set_remote_peer_id(&self, remote_id: String) {
        self.queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
            signaler.set_remote_peer_id(remote_id)
        });
    }

    /// Run `f` on the processing context and wait for its result
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut RelaySignaler<P>) -> R + Send + 'static,
    {
        self.queue.call(f).await
    }
}

impl<P: NegotiationTarget + 'static> EngineObserver for SignalerHandle<P> {
    fn on_ice_candidate(&self, candidate: IceCandidate) {
        self.on_local_ice_candidate_ready(
            candidate.candidate,
            candidate.sdp_mline_index,
            candidate.sdp_mid,
        );
    }

    fn on_renegotiation_needed(&self) {
        self.queue
            .enqueue(|signaler: &mut RelaySignaler<P>| signaler.on_renegotiation_needed());
    }

    fn on_connected(&self) {
        self.queue
            .enqueue(|signaler: &mut RelaySignaler<P>| signaler.on_connected());
    }

    fn on_ice_connection_state_change(&self, state: IceConnectionState) {
        self.queue.enqueue(move |signaler: &mut RelaySignaler<P>| {
            signaler.on_ice_connection_state_change(state)
        });
    }
}
