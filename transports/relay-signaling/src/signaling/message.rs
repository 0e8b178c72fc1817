//! Relay wire format for signaling messages
//!
//! Messages travel as JSON objects:
//!
//! ```json
//! {"kind": "Offer", "data": "v=0...", "iceDataSeparator": "|"}
//! ```
//!
//! For ICE candidates `data` holds the composite
//! `candidate<sep>sdpMLineIndex<sep>sdpMid`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of signaling message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// Trickled ICE candidate (wire name "Ice")
    IceCandidate,
    /// Anything else; ignored by the coordinator
    Unknown,
}

impl MessageKind {
    /// Wire name of this kind
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            MessageKind::Offer => "Offer",
            MessageKind::Answer => "Answer",
            MessageKind::IceCandidate => "Ice",
            MessageKind::Unknown => "Unknown",
        }
    }

    fn from_wire_str(kind: &str) -> Option<Self> {
        match kind {
            "Offer" => Some(MessageKind::Offer),
            "Answer" => Some(MessageKind::Answer),
            "Ice" => Some(MessageKind::IceCandidate),
            "Unknown" => Some(MessageKind::Unknown),
            _ => None,
        }
    }
}

/// A single signaling message exchanged through the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    /// Message kind
    pub kind: MessageKind,
    /// SDP text, or the ICE composite for candidates
    pub payload: String,
    /// Separator used inside ICE composites
    pub ice_separator: String,
}

impl SignalingMessage {
    /// Build an offer message
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Offer,
            payload: sdp.into(),
            ice_separator: String::new(),
        }
    }

    /// Build an answer message
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Answer,
            payload: sdp.into(),
            ice_separator: String::new(),
        }
    }

    /// Build an ICE candidate message using `separator` for the composite
    ///
    /// Fails if the separator is empty or occurs inside `candidate` or
    /// `sdp_mid`, since the composite could not be split back apart.
    pub fn ice_candidate(candidate: &IceCandidate, separator: &str) -> Result<Self> {
        if separator.is_empty() {
            return Err(Error::IceCandidateError(
                "ICE separator must not be empty".to_string(),
            ));
        }
        if candidate.candidate.contains(separator) || candidate.sdp_mid.contains(separator) {
            return Err(Error::IceCandidateError(format!(
                "ICE candidate fields contain the separator {:?}",
                separator
            )));
        }
        Ok(Self {
            kind: MessageKind::IceCandidate,
            payload: candidate.to_payload(separator),
            ice_separator: separator.to_string(),
        })
    }

    /// Parse the ICE composite carried by this message
    pub fn parse_ice_candidate(&self) -> Result<IceCandidate> {
        if self.kind != MessageKind::IceCandidate {
            return Err(Error::DecodeError(format!(
                "expected an Ice message, got {:?}",
                self.kind
            )));
        }
        IceCandidate::from_payload(&self.payload, &self.ice_separator)
    }
}

/// ICE candidate fields as carried on the relay
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Index of the media line this candidate belongs to
    pub sdp_mline_index: u32,
    /// Media stream identification tag
    pub sdp_mid: String,
}

impl IceCandidate {
    /// Create a candidate
    pub fn new(candidate: impl Into<String>, sdp_mline_index: u32, sdp_mid: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index,
            sdp_mid: sdp_mid.into(),
        }
    }

    /// Join the fields as `candidate<sep>sdpMLineIndex<sep>sdpMid`
    pub fn to_payload(&self, separator: &str) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.candidate,
            self.sdp_mline_index,
            self.sdp_mid,
            sep = separator
        )
    }

    /// Split a composite produced by [`to_payload`](Self::to_payload)
    ///
    /// Exactly three fields are required and the middle one must be an integer.
    pub fn from_payload(payload: &str, separator: &str) -> Result<Self> {
        if separator.is_empty() {
            return Err(Error::DecodeError(
                "ICE payload has no separator".to_string(),
            ));
        }

        let parts: Vec<&str> = payload.split(separator).collect();
        let [candidate, index, mid] = parts.as_slice() else {
            return Err(Error::DecodeError(format!(
                "ICE payload must have 3 fields, got {}",
                parts.len()
            )));
        };

        let sdp_mline_index = index.parse::<u32>().map_err(|e| {
            Error::DecodeError(format!("invalid sdpMLineIndex {:?}: {}", index, e))
        })?;

        Ok(Self {
            candidate: (*candidate).to_string(),
            sdp_mline_index,
            sdp_mid: (*mid).to_string(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    data: String,
    #[serde(default, rename = "iceDataSeparator")]
    ice_data_separator: String,
}

/// Encode a message to relay bytes
pub fn encode(message: &SignalingMessage) -> Vec<u8> {
    let wire = WireMessage {
        kind: message.kind.as_wire_str().to_string(),
        data: message.payload.clone(),
        ice_data_separator: message.ice_separator.clone(),
    };
    // A struct of three strings always serializes
    serde_json::to_vec(&wire).unwrap_or_default()
}

/// Decode relay bytes into a message
///
/// Missing fields default to empty. Unrecognized kinds decode to
/// `MessageKind::Unknown` with the payload dropped. ICE composites are
/// validated here so a malformed candidate never reaches the coordinator.
pub fn decode(bytes: &[u8]) -> Result<SignalingMessage> {
    let wire: WireMessage = serde_json::from_slice(bytes)
        .map_err(|e| Error::DecodeError(format!("invalid signaling JSON: {}", e)))?;

    let Some(kind) = MessageKind::from_wire_str(&wire.kind) else {
        return Ok(SignalingMessage {
            kind: MessageKind::Unknown,
            payload: String::new(),
            ice_separator: wire.ice_data_separator,
        });
    };

    let message = SignalingMessage {
        kind,
        payload: wire.data,
        ice_separator: wire.ice_data_separator,
    };

    if kind == MessageKind::IceCandidate {
        message.parse_ice_candidate()?;
    }

    Ok(message)
}
