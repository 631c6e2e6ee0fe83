//! WebRTC configuration

use serde::{Deserialize, Serialize};

/// Public STUN servers used when nothing else is configured
pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// WebRTC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            turn_servers: vec![],
        }
    }
}

impl WebRtcConfig {
    /// Total number of configured ICE server entries
    pub fn ice_server_count(&self) -> usize {
        self.stun_servers.len() + self.turn_servers.len()
    }

    pub fn has_turn(&self) -> bool {
        !self.turn_servers.is_empty()
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g., ["turn:turn.example.com:3478?transport=udp", "turn:turn.example.com:3478?transport=tcp"])
    /// Multiple URLs allow fallback between UDP and TCP transports
    pub urls: Vec<String>,
    /// Username for TURN authentication
    #[serde(default)]
    pub username: String,
    /// Credential for TURN authentication
    #[serde(default)]
    pub credential: String,
}

impl TurnServer {
    /// Create a TurnServer with a single URL
    pub fn new(url: String, username: String, credential: String) -> Self {
        Self {
            urls: vec![url],
            username,
            credential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_two_public_stun_servers() {
        let config = WebRtcConfig::default();
        assert_eq!(
            config.stun_servers,
            vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ]
        );
        assert!(!config.has_turn());
        assert_eq!(config.ice_server_count(), 2);
    }

    #[test]
    fn test_turn_from_toml() {
        let config: WebRtcConfig = toml::from_str(
            r#"
            stun_servers = []
            [[turn_servers]]
            urls = ["turn:relay.example.com:3478?transport=udp"]
            username = "agent"
            credential = "secret"
            "#,
        )
        .unwrap();

        assert!(config.stun_servers.is_empty());
        assert!(config.has_turn());
        assert_eq!(config.turn_servers[0].username, "agent");
    }
}
