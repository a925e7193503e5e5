//! Configuration types for the call coordinator

use serde::{Deserialize, Serialize};

/// Main configuration for a [`CallSession`](crate::CallSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub relay_url: String,

    /// Negotiation-server URLs (stun:/turn:/turns:)
    ///
    /// A URL with no scheme is treated as `turn:`. When the list is empty,
    /// or contains no TURN server, a public STUN fallback is used so basic
    /// connectivity discovery is always available.
    pub ice_urls: Vec<String>,

    /// Username applied to every configured negotiation server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_username: Option<String>,

    /// Credential applied to every configured negotiation server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_credential: Option<String>,

    /// Maximum peers in the mesh (default: 10)
    pub max_peers: u32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8080".to_string(),
            ice_urls: Vec::new(),
            ice_username: None,
            ice_credential: None,
            max_peers: 10,
        }
    }
}

impl CallConfig {
    /// Create a configuration pointing at the given relay
    pub fn new(relay_url: &str) -> Self {
        Self {
            relay_url: relay_url.to_string(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not a valid WebSocket URL
    /// - `max_peers` is zero
    /// - credentials are set without any negotiation server to apply them to
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with ws:// or wss://, got {}",
                self.relay_url
            )));
        }

        if self.max_peers == 0 {
            return Err(Error::InvalidConfig(
                "max_peers must be at least 1".to_string(),
            ));
        }

        if self.ice_urls.is_empty() && (self.ice_username.is_some() || self.ice_credential.is_some())
        {
            return Err(Error::InvalidConfig(
                "ICE credentials configured without any ice_urls".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the negotiation-server URLs
    ///
    /// Useful for chaining with `new()`.
    pub fn with_ice_urls(mut self, urls: Vec<String>) -> Self {
        self.ice_urls = urls;
        self
    }

    /// Set the negotiation-server credentials
    ///
    /// Useful for chaining with `new()`.
    pub fn with_ice_credentials(mut self, username: &str, credential: &str) -> Self {
        self.ice_username = Some(username.to_string());
        self.ice_credential = Some(credential.to_string());
        self
    }

    /// Set the maximum number of mesh peers
    pub fn with_max_peers(mut self, max_peers: u32) -> Self {
        self.max_peers = max_peers;
        self
    }
}
