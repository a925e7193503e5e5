//! Peer registry: per-participant state for the mesh
//!
//! One entry per remote participant, keyed by relay-assigned id. The
//! registry is plain data behind the session lock; transports are closed
//! by the coordinator after removal, not in here.

use super::transport::PeerTransport;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Connection lifecycle state of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Known via signaling, no media yet (placeholder tile)
    Pending,
    /// First media arrived
    Connected,
}

/// State tracked for one remote participant
pub struct PeerEntry {
    /// Display name from signaling (falls back to the peer id)
    pub display_name: String,

    /// Last known remote video toggle state
    pub remote_video_enabled: bool,

    /// Lifecycle state
    pub state: PeerState,

    /// The point-to-point connection, once one exists
    ///
    /// Entries created from an `introduction` have no transport until the
    /// remote initiator's first signal arrives.
    pub transport: Option<Arc<dyn PeerTransport>>,
}

impl std::fmt::Debug for PeerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEntry")
            .field("display_name", &self.display_name)
            .field("remote_video_enabled", &self.remote_video_enabled)
            .field("state", &self.state)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

/// Registry of remote participants in the current call
pub struct PeerRegistry {
    peers: HashMap<String, PeerEntry>,
    max_peers: u32,
}

impl PeerRegistry {
    /// Create an empty registry with a participant limit
    pub fn new(max_peers: u32) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
        }
    }

    /// Record a newly known participant
    ///
    /// Returns `Ok(false)` if the peer is already known (signaling events
    /// for known peers are no-ops).
    ///
    /// # Errors
    ///
    /// Returns `Error::PeerLimitReached` when the mesh is full.
    pub fn insert(
        &mut self,
        peer_id: &str,
        display_name: &str,
        video_enabled: bool,
    ) -> Result<bool> {
        if self.peers.contains_key(peer_id) {
            debug!("Peer {} already registered, ignoring", peer_id);
            return Ok(false);
        }

        if self.peers.len() >= self.max_peers as usize {
            return Err(Error::PeerLimitReached(self.max_peers));
        }

        self.peers.insert(
            peer_id.to_string(),
            PeerEntry {
                display_name: display_name.to_string(),
                remote_video_enabled: video_enabled,
                state: PeerState::Pending,
                transport: None,
            },
        );

        debug!("Registered peer {} ({})", peer_id, display_name);
        Ok(true)
    }

    /// Attach a transport to an existing entry
    ///
    /// # Errors
    ///
    /// Returns `Error::PeerNotFound` if the peer is not registered.
    pub fn attach_transport(
        &mut self,
        peer_id: &str,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<()> {
        let entry = self
            .peers
            .get_mut(peer_id)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;
        entry.transport = Some(transport);
        Ok(())
    }

    /// Mark a peer connected
    ///
    /// Returns `Ok(true)` only on the Pending -> Connected transition, so
    /// duplicate media notifications collapse.
    pub fn mark_connected(&mut self, peer_id: &str) -> Result<bool> {
        let entry = self
            .peers
            .get_mut(peer_id)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;

        if entry.state == PeerState::Connected {
            return Ok(false);
        }
        entry.state = PeerState::Connected;
        Ok(true)
    }

    /// Record a peer's video toggle state
    pub fn set_remote_video(&mut self, peer_id: &str, enabled: bool) -> Result<()> {
        let entry = self
            .peers
            .get_mut(peer_id)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;
        entry.remote_video_enabled = enabled;
        Ok(())
    }

    /// Look up a peer entry
    pub fn get(&self, peer_id: &str) -> Option<&PeerEntry> {
        self.peers.get(peer_id)
    }

    /// Whether a peer is registered
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// The transport for one peer, if it has one
    pub fn transport(&self, peer_id: &str) -> Option<Arc<dyn PeerTransport>> {
        self.peers.get(peer_id).and_then(|e| e.transport.clone())
    }

    /// All live transports (for track replacement fan-out)
    pub fn transports(&self) -> Vec<Arc<dyn PeerTransport>> {
        self.peers
            .values()
            .filter_map(|e| e.transport.clone())
            .collect()
    }

    /// Remove a peer, returning its entry
    pub fn remove(&mut self, peer_id: &str) -> Option<PeerEntry> {
        let entry = self.peers.remove(peer_id);
        if entry.is_some() {
            debug!("Removed peer {}", peer_id);
        }
        entry
    }

    /// Remove and return every entry (call teardown)
    pub fn drain(&mut self) -> Vec<(String, PeerEntry)> {
        self.peers.drain().collect()
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Registered peer ids
    pub fn ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }
}
