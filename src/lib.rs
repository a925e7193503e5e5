//! Peer-mesh call session coordination
//!
//! This crate coordinates one participant's presence in a small
//! full-mesh video call: local capture, relay signaling, one peer
//! connection per remote participant, and outgoing track state
//! (mute, camera toggle, screen-share substitution).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Host application (UI)                               │
//! │    ↑ SessionEvent stream        ↓ control calls      │
//! │  CallSession                                         │
//! │  ├─ MediaDevices (capture capability)                │
//! │  ├─ SignalingConnector (WebSocket relay channel)     │
//! │  ├─ PeerRegistry (one entry per remote participant)  │
//! │  │   └─ PeerTransport (webrtc-rs, one per peer)      │
//! │  └─ outgoing track state (mute / video / share)      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The mesh is symmetric: everyone connects directly to everyone.
//! The participant that was present first initiates each connection;
//! the newcomer answers.
//!
//! # Example
//!
//! ```
//! use meshcall::CallConfig;
//!
//! let config = CallConfig::new("wss://relay.example.com")
//!     .with_ice_urls(vec!["turn.example.com:3478".to_string()])
//!     .with_ice_credentials("user", "secret");
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async usage
//!
//! ```no_run
//! use meshcall::{CallConfig, CallSession, SessionEvent};
//! use std::sync::Arc;
//!
//! # async fn example(devices: Arc<dyn meshcall::MediaDevices>) -> meshcall::Result<()> {
//! let config = CallConfig::new("ws://localhost:8080");
//! let (session, mut events) = CallSession::with_default_stack(config, devices)?;
//!
//! session.join("Ana").await?;
//! session.set_audio_enabled(true).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::PeerAdded { display_name, .. } = event {
//!         println!("{} is here", display_name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod ice;
pub mod media;

mod call;
mod peer;
mod signaling;

// Re-exports for public API
pub use call::CallSession;
pub use config::CallConfig;
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use ice::{build_ice_servers, IceServer, FALLBACK_STUN_URL};
pub use media::{MediaDevices, MediaStream, MediaTrack, TrackKind, TrackSource};
pub use peer::{
    PeerEventSender, PeerRegistry, PeerRole, PeerState, PeerTransport, PeerTransportEvent,
    PeerTransportFactory, RtcTransportFactory, SignalPayload,
};
pub use signaling::{
    ClientMessage, PeerIntro, RelayMessage, SignalingConnection, SignalingConnector,
    WebSocketConnector,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
