//! Negotiation-server list construction
//!
//! Pure translation from [`CallConfig`] connection settings to the ICE
//! server list handed to the transport layer. URLs with no scheme default
//! to `turn:`; a public STUN server is used as fallback when no servers
//! are configured, and appended when the configured servers offer no
//! relay-through-NAT capability.

use crate::config::CallConfig;
use serde::{Deserialize, Serialize};

/// Public fallback connectivity-discovery server
pub const FALLBACK_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// One negotiation server with optional credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (stun:/turn:/turns:)
    pub urls: Vec<String>,

    /// Username for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Credential for TURN authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    fn stun_fallback() -> Self {
        Self {
            urls: vec![FALLBACK_STUN_URL.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Whether any URL of this server provides relay-through-NAT
    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|url| url.starts_with("turn:") || url.starts_with("turns:"))
    }
}

/// Build the negotiation-server list for new peer connections
pub fn build_ice_servers(config: &CallConfig) -> Vec<IceServer> {
    let mut servers: Vec<IceServer> = config
        .ice_urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(|url| {
            let url = if url.starts_with("stun:")
                || url.starts_with("turn:")
                || url.starts_with("turns:")
            {
                url.to_string()
            } else {
                format!("turn:{url}")
            };

            IceServer {
                urls: vec![url],
                username: config.ice_username.clone(),
                credential: config.ice_credential.clone(),
            }
        })
        .collect();

    if servers.is_empty() {
        servers.push(IceServer::stun_fallback());
    } else if !servers.iter().any(IceServer::is_turn) {
        // Never skip the discovery fallback when only STUN is configured.
        servers.push(IceServer::stun_fallback());
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_fallback() {
        let config = CallConfig::default();
        let servers = build_ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec![FALLBACK_STUN_URL.to_string()]);
        assert!(servers[0].username.is_none());
    }

    #[test]
    fn test_schemeless_url_becomes_turn() {
        let config =
            CallConfig::default().with_ice_urls(vec!["turn.example.com:3478".to_string()]);
        let servers = build_ice_servers(&config);
        assert_eq!(servers[0].urls, vec!["turn:turn.example.com:3478".to_string()]);
    }

    #[test]
    fn test_turn_present_skips_fallback() {
        let config = CallConfig::default()
            .with_ice_urls(vec!["turn:turn.example.com:3478".to_string()])
            .with_ice_credentials("user", "pass");
        let servers = build_ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert!(servers[0].is_turn());
        assert_eq!(servers[0].username.as_deref(), Some("user"));
        assert_eq!(servers[0].credential.as_deref(), Some("pass"));
    }

    #[test]
    fn test_stun_only_appends_fallback() {
        let config =
            CallConfig::default().with_ice_urls(vec!["stun:stun.example.com".to_string()]);
        let servers = build_ice_servers(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].urls, vec![FALLBACK_STUN_URL.to_string()]);
    }

    #[test]
    fn test_turns_counts_as_relay() {
        let config =
            CallConfig::default().with_ice_urls(vec!["turns:turn.example.com:5349".to_string()]);
        let servers = build_ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert!(servers[0].is_turn());
    }

    #[test]
    fn test_whitespace_and_empty_urls_dropped() {
        let config = CallConfig::default().with_ice_urls(vec![
            "  stun:stun.example.com  ".to_string(),
            "".to_string(),
            "   ".to_string(),
        ]);
        let servers = build_ice_servers(&config);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.com".to_string()]);
        // one configured server plus the appended fallback
        assert_eq!(servers.len(), 2);
    }
}
