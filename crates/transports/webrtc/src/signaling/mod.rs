//! Signaling client for the two-party room relay
//!
//! Room admission and the opaque peer payloads travel as JSON text frames
//! over a single WebSocket; see [`duet_core::protocol`] for the envelopes.

mod client;

pub use client::SignalingClient;
