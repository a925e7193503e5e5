//! Peer transport capability
//!
//! One transport is a single point-to-point connection to one remote
//! participant. The coordinator only ever sees these traits; the
//! production implementation lives in [`rtc`](super::rtc) and tests
//! substitute in-memory fakes.

use crate::media::{MediaStream, MediaTrack};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which side starts negotiation for a connection
///
/// The participant that was present first initiates; the newcomer waits
/// for the inbound offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Local side creates the offer
    Initiator,
    /// Local side answers the remote offer
    Responder,
}

/// Events surfaced by a transport to the coordinator
///
/// Delivered as `(peer_id, event)` pairs on the channel handed to
/// [`PeerTransportFactory::create`].
#[derive(Debug)]
pub enum PeerTransportEvent {
    /// Outbound negotiation data to forward to the remote side verbatim
    Signal {
        /// Opaque negotiation payload
        payload: serde_json::Value,
    },

    /// First inbound media from the remote side
    MediaArrived {
        /// Remote stream handle
        stream: MediaStream,
    },

    /// The connection failed or was dropped by the remote side
    Closed {
        /// Human-readable reason, for logging
        reason: String,
    },
}

/// A live point-to-point connection to one remote participant
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply inbound negotiation data from the remote side
    ///
    /// # Errors
    ///
    /// Returns `Error::UnroutableSignal` for payloads that cannot be
    /// parsed, or a negotiation error from the underlying stack.
    async fn apply_signal(&self, payload: serde_json::Value) -> Result<()>;

    /// Replace the outgoing video track without renegotiating
    async fn replace_video_track(&self, track: MediaTrack) -> Result<()>;

    /// Tear down the connection
    async fn close(&self) -> Result<()>;
}

/// Shared channel carrying transport events back to the coordinator
pub type PeerEventSender = mpsc::UnboundedSender<(String, PeerTransportEvent)>;

/// Factory for [`PeerTransport`] connections
#[async_trait::async_trait]
pub trait PeerTransportFactory: Send + Sync {
    /// Create a connection to `peer_id` carrying the current local stream
    ///
    /// An [`PeerRole::Initiator`] transport starts negotiating immediately
    /// and emits its first `Signal` event before this resolves; a
    /// [`PeerRole::Responder`] transport stays quiet until
    /// [`PeerTransport::apply_signal`] delivers the remote offer.
    async fn create(
        &self,
        peer_id: &str,
        role: PeerRole,
        local_stream: MediaStream,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerTransport>>;
}
