//! Relay signaling: wire protocol and the WebSocket channel

mod client;
mod protocol;

pub use client::{SignalingConnection, SignalingConnector, WebSocketConnector};
pub use protocol::{ClientMessage, PeerIntro, RelayMessage};
