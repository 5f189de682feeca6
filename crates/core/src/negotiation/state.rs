//! Negotiation roles and transport states

use crate::protocol::ServerMessage;
use serde::{Deserialize, Serialize};

/// Collision-resolution role of the local side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoliteRole {
    /// Yields to a colliding remote offer
    Polite,
    /// Keeps its own offer and ignores a colliding remote offer
    Impolite,
}

impl PoliteRole {
    /// Role implied by a room admission message
    ///
    /// `created` and `join` go to the initiator, which is impolite; `joined`
    /// goes to the later arrival, which is polite.
    ///
    /// # Example
    ///
    /// ```
    /// use duet_core::negotiation::PoliteRole;
    /// use duet_core::protocol::ServerMessage;
    ///
    /// let joined = ServerMessage::Joined { room_id: "R1".to_string() };
    /// assert_eq!(PoliteRole::from_admission(&joined), Some(PoliteRole::Polite));
    /// assert_eq!(PoliteRole::from_admission(&ServerMessage::Full), None);
    /// ```
    pub fn from_admission(message: &ServerMessage) -> Option<Self> {
        match message {
            ServerMessage::Created { .. } | ServerMessage::Join { .. } => {
                Some(PoliteRole::Impolite)
            }
            ServerMessage::Joined { .. } => Some(PoliteRole::Polite),
            _ => None,
        }
    }

    /// Whether this side yields on collision
    pub fn is_polite(&self) -> bool {
        matches!(self, PoliteRole::Polite)
    }
}

/// Description exchange state, mirroring the transport's signaling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    /// No exchange in progress
    Stable,
    /// Local offer applied, awaiting the answer
    HaveLocalOffer,
    /// Remote offer applied, answer not yet created
    HaveRemoteOffer,
    /// Transport closed
    Closed,
}

/// Peer connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not started
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media and data can flow
    Connected,
    /// Connectivity lost
    Disconnected,
    /// ICE failed; an ICE restart may recover
    Failed,
    /// Connection closed
    Closed,
}
