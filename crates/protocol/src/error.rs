//! Error types for the wire protocol.

/// Errors produced while encoding, decoding or transporting frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed before frame completed")]
    UnexpectedEof,
}
