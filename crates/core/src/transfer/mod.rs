//! Chunked transfer engine
//!
//! A payload is announced out-of-band with a [`TransferMetadata`] message
//! (size + name) over the signaling path, then streamed as fixed-size chunks
//! over a flow-controlled [`ChunkChannel`]. The sender paces itself against a
//! high/low watermark pair on the channel's buffered amount; the receiver
//! reassembles chunks in arrival order and completes exactly once, when the
//! received byte count reaches the announced size.
//!
//! [`TransferMetadata`]: crate::protocol::TransferMetadata

mod bound;
mod channel;
mod progress;
mod receiver;
mod sender;

pub use bound::{Announced, BoundReceiver};
pub use channel::ChunkChannel;
pub use progress::ProgressThrottle;
pub use receiver::{ChunkOutcome, ChunkReceiver, PendingPayload, ReceivedPayload};
pub use sender::{ChunkSender, SendReport};
