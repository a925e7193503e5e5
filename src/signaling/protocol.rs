//! Relay wire protocol types
//!
//! JSON text frames exchanged with the relay over a persistent
//! bidirectional channel. The relay rebroadcasts envelopes without
//! interpreting them; negotiation payloads stay opaque here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Participant info carried by an `introduction`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIntro {
    /// Display name the participant registered with
    pub display_name: String,

    /// The participant's current video toggle state
    pub video_enabled: bool,
}

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Register the local identity after transport-connect
    Register {
        /// Display name chosen at join time
        identity: String,
    },

    /// Forward opaque negotiation data to one participant
    #[serde(rename_all = "camelCase")]
    Signal {
        /// Recipient participant id
        to: String,
        /// Sender participant id (the local id)
        from: String,
        /// Opaque negotiation data, relayed verbatim
        payload: serde_json::Value,
    },

    /// Announce the local video toggle state to everyone
    #[serde(rename = "announceVideoToggled")]
    AnnounceVideoToggled {
        /// New toggle state
        enabled: bool,
    },
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayMessage {
    /// Registration acknowledged; carries the relay-assigned local id
    #[serde(rename_all = "camelCase")]
    Registered {
        /// The local participant id for this connection
        peer_id: String,
    },

    /// Participants already present when the local side registered
    Introduction {
        /// Map of participant id to its info
        peers: HashMap<String, PeerIntro>,
    },

    /// A new participant registered after the local side
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        /// The newcomer's participant id
        peer_id: String,
        /// The newcomer's display name
        display_name: String,
    },

    /// A participant disconnected
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        /// The departed participant id
        peer_id: String,
    },

    /// Opaque negotiation data from another participant
    #[serde(rename_all = "camelCase")]
    Signal {
        /// Recipient participant id
        to: String,
        /// Sender participant id
        from: String,
        /// Opaque negotiation data
        payload: serde_json::Value,
    },

    /// A participant changed its video toggle state
    #[serde(rename_all = "camelCase")]
    ParticipantVideoToggled {
        /// The participant id
        peer_id: String,
        /// New toggle state
        enabled: bool,
    },
}

impl ClientMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize client message: {e}"))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize client message: {e}"))
        })
    }
}

impl RelayMessage {
    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize relay message: {e}"))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize relay message: {e}"))
        })
    }
}
