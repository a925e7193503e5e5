//! Event surface consumed by the presentation host
//!
//! The coordinator never touches presentation state directly; it emits
//! these events and the host renders tiles/placeholders from them.

use crate::media::MediaStream;

/// State change emitted to the presentation adapter
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Local capture succeeded and the call is live
    LocalStreamReady {
        /// Local stream handle for the self-view tile
        stream: MediaStream,
    },

    /// A remote participant became known (placeholder tile)
    PeerAdded {
        /// Relay-assigned participant id
        peer_id: String,
        /// Participant display name
        display_name: String,
        /// Last known remote video toggle state
        video_enabled: bool,
    },

    /// A remote participant left or its transport dropped
    PeerRemoved {
        /// Relay-assigned participant id
        peer_id: String,
    },

    /// First media arrived from a participant's transport
    PeerStream {
        /// Relay-assigned participant id
        peer_id: String,
        /// Remote stream handle for the participant's tile
        stream: MediaStream,
    },

    /// A remote participant toggled its video
    PeerVideoToggled {
        /// Relay-assigned participant id
        peer_id: String,
        /// New toggle state
        enabled: bool,
    },

    /// The local video toggle state changed
    LocalVideoToggled {
        /// New toggle state
        enabled: bool,
    },
}

impl SessionEvent {
    /// The participant id this event concerns, if any
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            SessionEvent::PeerAdded { peer_id, .. }
            | SessionEvent::PeerRemoved { peer_id }
            | SessionEvent::PeerStream { peer_id, .. }
            | SessionEvent::PeerVideoToggled { peer_id, .. } => Some(peer_id),
            SessionEvent::LocalStreamReady { .. } | SessionEvent::LocalVideoToggled { .. } => None,
        }
    }
}
