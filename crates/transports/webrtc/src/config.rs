//! Configuration types for a WebRTC peer session

use duet_core::config::{StatsConfig, TransferConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest SCTP message webrtc-rs accepts on a data channel (64 KiB)
pub const SCTP_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Main configuration for a peer session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join
    pub room_id: String,

    /// STUN server URLs (may be empty for host-only connectivity)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Chunked transfer settings, chunk size capped to the SCTP message limit
    pub transfer: TransferConfig,

    /// Stats sampling settings
    pub stats: StatsConfig,

    /// ICE restarts attempted after `failed` before giving up (default: 3)
    pub max_ice_restarts: u32,

    /// How long a sender waits for the receiver's `ready` (default: 10s)
    pub ready_timeout_ms: u64,

    /// How long a sender waits for a transfer channel to open (default: 10s)
    pub channel_open_timeout_ms: u64,

    /// Capacity of the application event channel (default: 256)
    pub event_buffer: usize,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            room_id: String::new(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            transfer: TransferConfig::for_message_limit(SCTP_MAX_MESSAGE_SIZE),
            stats: StatsConfig::default(),
            max_ice_restarts: 3,
            ready_timeout_ms: 10_000,
            channel_open_timeout_ms: 10_000,
            event_buffer: 256,
        }
    }
}

impl PeerConfig {
    /// Default configuration for `room_id` on `signaling_url`
    pub fn new(signaling_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            room_id: room_id.into(),
            ..Default::default()
        }
    }

    /// Replace the STUN server list
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Add TURN servers to configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Replace the transfer configuration
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a valid WebSocket URL
    /// - `room_id` is empty
    /// - a TURN URL does not use the turn: or turns: scheme
    /// - the transfer or stats configuration is invalid
    /// - `transfer.max_message_size` exceeds the SCTP message limit
    /// - a timeout or `event_buffer` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room_id.is_empty() {
            return Err(Error::InvalidConfig("room_id must not be empty".to_string()));
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server URL must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        self.transfer.validate()?;

        if self.transfer.max_message_size > SCTP_MAX_MESSAGE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "transfer.max_message_size {} exceeds the data channel limit {}",
                self.transfer.max_message_size, SCTP_MAX_MESSAGE_SIZE
            )));
        }

        if self.stats.enabled {
            self.stats.validate()?;
        }

        if self.ready_timeout_ms == 0 || self.channel_open_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ready_timeout_ms and channel_open_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Ready acknowledgement timeout
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Transfer channel open timeout
    pub fn channel_open_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_open_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_room() {
        let config = PeerConfig::default();
        assert!(config.validate().unwrap_err().is_config_error());

        let config = PeerConfig::new("ws://localhost:8080", "R1");
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.chunk_size, SCTP_MAX_MESSAGE_SIZE);
        assert_eq!(config.max_ice_restarts, 3);
    }

    #[test]
    fn test_invalid_signaling_url() {
        let config = PeerConfig::new("http://localhost:8080", "R1");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_turn_url() {
        let config = PeerConfig::new("ws://localhost:8080", "R1").with_turn_servers(vec![
            TurnServerConfig {
                url: "stun:turn.example.com:3478".to_string(),
                username: "user".to_string(),
                credential: "pass".to_string(),
            },
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transfer_must_fit_sctp_messages() {
        let config = PeerConfig::new("ws://localhost:8080", "R1")
            .with_transfer(TransferConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_stats_skip_validation() {
        let mut config = PeerConfig::new("ws://localhost:8080", "R1");
        config.stats.interval_ms = 1;
        assert!(config.validate().is_err());

        config.stats.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: PeerConfig =
            serde_json::from_str(r#"{"signaling_url": "ws://host:9000", "room_id": "R7"}"#)
                .unwrap();
        assert_eq!(config.room_id, "R7");
        assert_eq!(config.ready_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }
}
