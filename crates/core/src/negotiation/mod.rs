//! Perfect negotiation
//!
//! Drives the offer/answer and candidate exchange for one peer pair and
//! resolves offer collisions with a polite/impolite role split:
//!
//! - The **impolite** side (room initiator) always keeps its own offer and
//!   ignores a colliding remote offer.
//! - The **polite** side (later joiner) rolls back its own offer and accepts
//!   the remote one.
//!
//! [`Negotiator`] is the single dispatch point for inbound negotiation events.
//! It talks to the media stack only through [`NegotiationTransport`], so the
//! state machine runs unchanged against an in-memory transport in tests.

mod negotiator;
mod state;
mod transport;

pub use negotiator::Negotiator;
pub use state::{ConnectionState, PoliteRole, SignalingState};
pub use transport::NegotiationTransport;
