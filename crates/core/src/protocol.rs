//! Signaling wire protocol
//!
//! Two layers travel over the signaling WebSocket as JSON text frames:
//!
//! - [`ClientMessage`] / [`ServerMessage`]: the envelope exchanged between a peer
//!   and the relay (room admission, relay requests, departures).
//! - [`PeerMessage`]: the payload one peer addresses to the other. The relay
//!   forwards it as an opaque JSON value and never inspects it.
//!
//! Every message is tagged by a `type` field in kebab-case, e.g.
//! `{"type":"join-room","roomId":"R1"}`.

use crate::stats::StatsSnapshot;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Peer -> relay envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request admission to a room
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },

    /// Forward `payload` to the other occupant of `room_id`
    #[serde(rename_all = "camelCase")]
    Message { room_id: String, payload: Value },

    /// Leave the room without closing the connection
    #[serde(rename_all = "camelCase")]
    Leave { room_id: String },

    /// Persist a stats log on the relay (not forwarded)
    #[serde(rename_all = "camelCase")]
    StatsReport {
        room_id: String,
        name: String,
        samples: Vec<StatsSnapshot>,
    },
}

impl ClientMessage {
    /// Wrap a peer message in a relay envelope
    pub fn relay(room_id: impl Into<String>, message: &PeerMessage) -> Result<Self> {
        Ok(ClientMessage::Message {
            room_id: room_id.into(),
            payload: serde_json::to_value(message)?,
        })
    }

    /// Room this envelope refers to
    pub fn room_id(&self) -> &str {
        match self {
            ClientMessage::JoinRoom { room_id }
            | ClientMessage::Message { room_id, .. }
            | ClientMessage::Leave { room_id }
            | ClientMessage::StatsReport { room_id, .. } => room_id,
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::ProtocolError(format!("Invalid client message: {}", e)))
    }
}

/// Relay -> peer envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First occupant admitted; the receiver is the room's initiator
    #[serde(rename_all = "camelCase")]
    Created { room_id: String },

    /// A second occupant arrived (sent to the existing occupant)
    #[serde(rename_all = "camelCase")]
    Join { room_id: String },

    /// Admitted as the second occupant
    #[serde(rename_all = "camelCase")]
    Joined { room_id: String },

    /// Room already holds two occupants; the join was rejected
    Full,

    /// The partner left the room
    #[serde(rename_all = "camelCase")]
    Left { room_id: String },

    /// Payload relayed unmodified from the partner
    Message { payload: Value },

    /// Request could not be processed
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Create an error envelope
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// Message type name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Created { .. } => "created",
            ServerMessage::Join { .. } => "join",
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::Full => "full",
            ServerMessage::Left { .. } => "left",
            ServerMessage::Message { .. } => "message",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::ProtocolError(format!("Invalid server message: {}", e)))
    }
}

/// Error codes carried by [`ServerMessage::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Frame was not a valid client message
    MalformedMessage,
    /// Connection already occupies a room
    AlreadyJoined,
    /// Stats report could not be stored
    ReportRejected,
}

/// Peer -> peer payload, relayed opaquely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerMessage {
    /// Offer or answer
    Description(SessionDescription),

    /// Trickled ICE candidate
    Candidate(IceCandidate),

    /// Receiver acknowledges a metadata announcement
    Ready,

    /// Announces an upcoming transfer; always precedes its chunks
    Metadata(TransferMetadata),

    /// Identifies what a media stream carries
    #[serde(rename_all = "camelCase")]
    ContentTag { stream_id: String, tag: ContentKind },
}

impl PeerMessage {
    /// Message type name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            PeerMessage::Description(_) => "description",
            PeerMessage::Candidate(_) => "candidate",
            PeerMessage::Ready => "ready",
            PeerMessage::Metadata(_) => "metadata",
            PeerMessage::ContentTag { .. } => "content-tag",
        }
    }

    /// Decode a relayed payload
    pub fn from_payload(payload: Value) -> Result<Self> {
        serde_json::from_value(payload)
            .map_err(|e| Error::ProtocolError(format!("Invalid peer message: {}", e)))
    }
}

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Offer/answer blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpKind,
    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether this is an offer
    pub fn is_offer(&self) -> bool {
        self.kind == SdpKind::Offer
    }
}

/// ICE candidate blob, field names follow `RTCIceCandidateInit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the m-line the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Size and name of an upcoming transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Total payload size in bytes
    pub size: u64,
    /// Payload name (file name for file transfers)
    pub name: String,
}

/// Content carried by a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    /// Camera capture
    Webcam,
    /// Screen capture
    ScreenShare,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Webcam => write!(f, "webcam"),
            ContentKind::ScreenShare => write!(f, "screenShare"),
        }
    }
}
