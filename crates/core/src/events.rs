//! Application-visible peer events
//!
//! Negotiation, transfer and routing components report upward through a
//! single `mpsc::Sender<PeerEvent>`; only admission results, connectivity
//! changes and transfer outcomes cross this boundary.

use crate::protocol::ContentKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Local payload streamed to the partner
    Outbound,
    /// Partner payload being reassembled locally
    Inbound,
}

/// Progress of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Outbound or inbound
    pub direction: TransferDirection,
    /// Name from the metadata announcement
    pub name: String,
    /// Bytes sent or received so far
    pub transferred: u64,
    /// Announced total
    pub total: u64,
}

impl TransferProgress {
    /// Whether all announced bytes were transferred
    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }

    /// Completion ratio in `[0.0, 1.0]`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.transferred as f64 / self.total as f64
        }
    }
}

/// Events emitted by a peer session
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// This peer created the room and is its initiator
    RoomCreated {
        /// Room identifier
        room_id: String,
    },

    /// This peer joined an occupied room
    RoomJoined {
        /// Room identifier
        room_id: String,
    },

    /// The room was full; the join attempt is terminal
    RoomFull,

    /// A partner arrived in this peer's room
    PeerJoined {
        /// Room identifier
        room_id: String,
    },

    /// The partner left the room
    PeerLeft {
        /// Room identifier
        room_id: String,
    },

    /// The peer connection reached `connected` (emitted once per connection)
    PeerConnected,

    /// The peer connection closed, disconnected or exhausted its ICE restarts
    PeerDisconnected {
        /// Optional reason
        reason: Option<String>,
    },

    /// Throttled transfer progress
    TransferProgress(TransferProgress),

    /// An outbound transfer finished
    TransferCompleted {
        /// Payload name
        name: String,
        /// Bytes queued on the channel
        bytes: u64,
        /// Whether the max-duration cutoff stopped the send early
        truncated: bool,
    },

    /// An inbound payload was fully reassembled
    PayloadReceived {
        /// Name from the metadata announcement
        name: String,
        /// Reassembled bytes
        data: Bytes,
    },

    /// A transfer was aborted
    TransferFailed {
        /// Outbound or inbound
        direction: TransferDirection,
        /// Human-readable reason
        message: String,
    },

    /// A remote media stream was matched with its content tag
    RemoteStream {
        /// Remote stream id
        stream_id: String,
        /// Content carried by the stream
        kind: ContentKind,
    },

    /// Non-fatal error surfaced to the application
    Error {
        /// Human-readable error message
        message: String,
    },
}

impl PeerEvent {
    /// Create a peer disconnected event
    pub fn peer_disconnected(reason: Option<String>) -> Self {
        Self::PeerDisconnected { reason }
    }

    /// Create a transfer failed event
    pub fn transfer_failed(direction: TransferDirection, message: impl Into<String>) -> Self {
        Self::TransferFailed {
            direction,
            message: message.into(),
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Get the event name (for logging/debugging)
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room_created",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomFull => "room_full",
            Self::PeerJoined { .. } => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::PeerConnected => "peer_connected",
            Self::PeerDisconnected { .. } => "peer_disconnected",
            Self::TransferProgress(_) => "transfer_progress",
            Self::TransferCompleted { .. } => "transfer_completed",
            Self::PayloadReceived { .. } => "payload_received",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::RemoteStream { .. } => "remote_stream",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(PeerEvent::PeerConnected.name(), "peer_connected");
        assert_eq!(
            PeerEvent::peer_disconnected(Some("closed".to_string())).name(),
            "peer_disconnected"
        );
        assert_eq!(
            PeerEvent::transfer_failed(TransferDirection::Inbound, "overflow").name(),
            "transfer_failed"
        );
    }

    #[test]
    fn test_progress_fraction() {
        let progress = TransferProgress {
            direction: TransferDirection::Outbound,
            name: "x".to_string(),
            transferred: 5,
            total: 10,
        };
        assert!((progress.fraction() - 0.5).abs() < f64::EPSILON);
        assert!(!progress.is_complete());

        let empty = TransferProgress {
            total: 0,
            transferred: 0,
            ..progress
        };
        assert!(empty.is_complete());
        assert!((empty.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
