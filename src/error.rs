//! Error types for the call coordinator

/// Result type alias using the coordinator Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in call coordination operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local capture failed (permission denied, no device, device busy)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An async result completed after its session was superseded
    #[error("Session {0} superseded by a newer join")]
    StaleSession(u64),

    /// Signaling envelope addressed to someone else or referencing an
    /// unknown peer with a malformed payload
    #[error("Unroutable signal: {0}")]
    UnroutableSignal(String),

    /// Peer connection failed to negotiate or dropped
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Camera re-acquisition failed after stopping a screen share
    #[error("Screen share restore failed: {0}")]
    ScreenShareRestoreFailure(String),

    /// Signaling connection error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Peer not found in the registry
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Mesh is already at its configured participant limit
    #[error("Peer limit reached ({0})")]
    PeerLimitReached(u32),

    /// Operation requires an active call
    #[error("Not in a call")]
    NotInCall,

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable(_)
                | Error::ScreenShareRestoreFailure(_)
                | Error::SignalingError(_)
                | Error::WebSocketError(_)
                | Error::IoError(_)
        )
    }

    /// Check if this error came from a local capture device
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnavailable(_) | Error::ScreenShareRestoreFailure(_)
        )
    }

    /// Check if this error is the benign stale-join outcome
    ///
    /// A superseded `join` reports this to its own caller after releasing
    /// the capture; it is not a user-facing failure.
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::StaleSession(_))
    }

    /// Check if this error is a peer-related error
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::TransportFailure(_)
                | Error::SdpError(_)
                | Error::IceCandidateError(_)
        )
    }
}
