//! Error types for relay signaling and track lifecycle

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling and peer connection operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete configuration (including a missing remote peer id on send)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Malformed relay payload
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Relay send/receive failure
    #[error("Relay transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Track is not owned by the connection it was removed from
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Data channel error, including use of an unknown or removed channel
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// The processing context went away before completing the request
    #[error("Signaler shut down before completing the request")]
    Shutdown,

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransportError(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::ConfigurationError(_))
    }

    /// Check if this error is a peer-related error
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnectionError(_)
                | Error::IceCandidateError(_)
                | Error::SdpError(_)
                | Error::DataChannelError(_)
        )
    }
}

/// Relay transport failures
///
/// "No data yet" is not an error; `RelayClient::receive` reports it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request could not be sent or the response could not be read
    #[error("relay request failed: {0}")]
    Request(String),

    /// Relay answered with an unexpected HTTP status
    #[error("relay returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Request exceeded the configured timeout
    #[error("relay request timed out")]
    Timeout,

    /// Relay base URL is unusable
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Timeouts, connection failures and 5xx answers are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(_) | TransportError::Timeout => true,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err.to_string())
        }
    }
}
