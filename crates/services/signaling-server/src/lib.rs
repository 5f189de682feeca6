//! Duet signaling server
//!
//! Admits exactly two peers per room and relays opaque JSON payloads between
//! them over WebSocket:
//!
//! ```text
//! peer A ──join-room──▶ ┌─────────┐ ◀──join-room── peer B
//!        ◀──created──── │  Relay  │ ───joined────▶
//!        ◀──join─────── │ (rooms) │
//!        ──message────▶ │         │ ───message───▶
//! ```
//!
//! The relay never inspects relayed payloads; negotiation and transfer
//! metadata are end-to-end between the peers.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handler;
pub mod relay;
pub mod reports;
pub mod rooms;
pub mod server;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use server::{SignalingServer, SignalingServerHandle};
