//! Error types for the WebRTC transport

/// Result type alias using the transport Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in WebRTC transport operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling connection error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// No partner is connected
    #[error("Session error: {0}")]
    SessionError(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Negotiation, transfer or protocol failure from the core
    #[error(transparent)]
    Core(#[from] duet_core::Error),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(#[from] webrtc::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocketError(err.to_string())
    }
}

impl From<Error> for duet_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            Error::OperationTimeout(msg) => duet_core::Error::TransportError(msg),
            Error::DataChannelError(msg) => duet_core::Error::ChannelClosed(msg),
            other => duet_core::Error::TransportError(other.to_string()),
        }
    }
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SignalingError(_)
            | Error::OperationTimeout(_)
            | Error::WebSocketError(_)
            | Error::IoError(_) => true,
            Error::Core(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::InvalidConfig(_) => true,
            Error::Core(inner) => inner.is_config_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");

        let err = Error::Core(duet_core::Error::SendFailed("gone".to_string()));
        assert_eq!(err.to_string(), "Send failed: gone");
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::SignalingError("test".to_string()).is_retryable());
        assert!(Error::OperationTimeout("test".to_string()).is_retryable());
        assert!(!Error::InvalidConfig("test".to_string()).is_retryable());
        assert!(Error::Core(duet_core::Error::TransportError("x".to_string())).is_retryable());
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(Error::Core(duet_core::Error::InvalidConfig("x".to_string())).is_config_error());
        assert!(!Error::SignalingError("test".to_string()).is_config_error());
    }

    #[test]
    fn test_into_core_error() {
        let core: duet_core::Error = Error::Core(duet_core::Error::UnannouncedChunk(3)).into();
        assert!(matches!(core, duet_core::Error::UnannouncedChunk(3)));

        let core: duet_core::Error = Error::OperationTimeout("ready".to_string()).into();
        assert!(matches!(core, duet_core::Error::TransportError(_)));

        let core: duet_core::Error = Error::DataChannelError("closed".to_string()).into();
        assert!(matches!(core, duet_core::Error::ChannelClosed(_)));
    }
}
