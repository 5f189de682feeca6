//! Error types for Duet core

/// Result type alias using the core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in negotiation, transfer and signaling protocol handling
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed or unexpected signaling message
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Session description could not be created or applied
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate could not be applied
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Underlying transport reported a failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Chunk could not be queued on the transfer channel
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Chunk arrived without a preceding metadata announcement
    #[error("Chunk received without metadata announcement ({0} bytes)")]
    UnannouncedChunk(usize),

    /// Chunk arrived on a channel that does not carry the current transfer
    #[error("Chunk on unbound channel {channel} ({len} bytes) discarded")]
    StrayChunk {
        /// Label of the channel the chunk arrived on
        channel: String,
        /// Chunk length
        len: usize,
    },

    /// Received more bytes than the metadata announced
    #[error("Size overflow: announced {announced} bytes, received {received}")]
    SizeOverflow {
        /// Size carried by the metadata announcement
        announced: u64,
        /// Bytes accumulated including the offending chunk
        received: u64,
    },

    /// Transfer channel or signaling path closed before completion
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportError(_) | Error::ChannelClosed(_) | Error::IoError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error aborts a transfer session
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            Error::SendFailed(_)
                | Error::UnannouncedChunk(_)
                | Error::StrayChunk { .. }
                | Error::SizeOverflow { .. }
        )
    }

    /// Check if this error came out of offer/answer or candidate handling
    pub fn is_negotiation_error(&self) -> bool {
        matches!(self, Error::SdpError(_) | Error::IceCandidateError(_))
    }
}
