//! Peer connections: registry, transport capability, webrtc-rs adapter

mod registry;
mod rtc;
mod transport;

pub use registry::{PeerEntry, PeerRegistry, PeerState};
pub use rtc::{RtcTransportFactory, SignalPayload};
pub use transport::{
    PeerEventSender, PeerRole, PeerTransport, PeerTransportEvent, PeerTransportFactory,
};
