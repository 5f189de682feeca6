//! WebRTC peer transport for Duet
//!
//! Connects two peers that meet in a signaling room over a single WebRTC
//! peer connection, negotiated with perfect negotiation, and carries:
//!
//! - **Payload transfers**: one ordered data channel per transfer, paced by
//!   buffered-amount watermarks and announced over signaling first
//! - **Media tracks**: local tracks published with a content tag, remote
//!   tracks routed by tag (`webcam` or `screenShare`)
//! - **Stats**: periodic candidate-pair samples, uploadable to the server
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Application (duet-peer CLI)                           │
//! │  ↑ PeerEvent (mpsc)                                    │
//! │  PeerSession                                           │
//! │  ├─ SignalingClient (JSON over WebSocket)              │
//! │  └─ Link (per partner)                                 │
//! │     ├─ PeerConnection ── Negotiator                    │
//! │     ├─ DataChannel ───── ChunkSender / ChunkReceiver   │
//! │     ├─ RemoteTracks ──── ContentRouter                 │
//! │     └─ StatsSampler ──── PeerStatsSource               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use duet_webrtc::PeerConfig;
//!
//! let config = PeerConfig::new("ws://localhost:8080", "R1").with_stun_servers(Vec::new());
//! assert!(config.validate().is_ok());
//! assert_eq!(config.transfer.chunk_size, 64 * 1024);
//! ```

#![warn(clippy::all)]

pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod stats;

pub use config::{PeerConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use session::PeerSession;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
