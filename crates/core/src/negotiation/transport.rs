use super::state::SignalingState;
use crate::protocol::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;

/// Capability surface the negotiator needs from the media stack
///
/// `create_local_offer` and `create_local_answer` both create the description
/// and apply it as the local description, returning what was applied.
#[async_trait]
pub trait NegotiationTransport: Send + Sync {
    /// Current description exchange state
    fn signaling_state(&self) -> SignalingState;

    /// Create and apply a local offer, optionally restarting ICE
    async fn create_local_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    /// Create and apply a local answer to the applied remote offer
    async fn create_local_answer(&self) -> Result<SessionDescription>;

    /// Apply a remote offer or answer
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Discard a pending local offer and return to `stable`
    async fn rollback(&self) -> Result<()>;

    /// Apply a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
}
