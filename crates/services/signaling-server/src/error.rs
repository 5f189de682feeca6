//! Error types for the signaling server

/// Result type alias using the server Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving signaling connections
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebSocket handshake or framing error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Report could not be persisted
    #[error("Report error: {0}")]
    ReportError(String),

    /// Protocol-level error from the core crate
    #[error(transparent)]
    Protocol(#[from] duet_core::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocketError(err.to_string())
    }
}

impl Error {
    /// Whether the error ends the connection it occurred on
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::WebSocketError(_) | Error::IoError(_))
    }
}
