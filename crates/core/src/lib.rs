//! Duet core
//!
//! Transport-agnostic building blocks for two-party peer sessions:
//!
//! - **Signaling protocol**: room admission envelopes and the opaque
//!   peer-to-peer payloads relayed between the two occupants of a room
//! - **Perfect negotiation**: offer/answer and candidate exchange with
//!   deterministic polite/impolite collision handling
//! - **Chunked transfer**: metadata-first payload streaming paced by
//!   high/low buffered-amount watermarks, with exactly-once reassembly
//! - **Content routing**: pairing remote tracks with out-of-band content tags
//! - **Stats sampling**: periodic, failure-tolerant transport diagnostics
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Application (CLI, UI)                                │
//! │  ↑ PeerEvent                                          │
//! │  PeerSession (transport crate)                        │
//! │  ├─ Negotiator ──────── NegotiationTransport          │
//! │  ├─ ChunkSender/Receiver ─ ChunkChannel               │
//! │  ├─ ContentRouter                                     │
//! │  └─ StatsSampler ────── StatsSource                   │
//! │  ↕ ClientMessage / ServerMessage (JSON over WebSocket)│
//! │  Signaling relay (room registry)                      │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use duet_core::config::TransferConfig;
//!
//! let config = TransferConfig {
//!     chunk_size: 64 * 1024,
//!     high_water_mark: 512 * 1024,
//!     low_water_mark: 256 * 1024,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod negotiation;
pub mod paths;
pub mod protocol;
pub mod stats;
pub mod transfer;

pub use config::{StatsConfig, TransferConfig};
pub use error::{Error, Result};
pub use events::{PeerEvent, TransferDirection, TransferProgress};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
