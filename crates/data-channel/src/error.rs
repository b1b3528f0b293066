//! Error types for the data channel.

use saknet_protocol::WireError;
use saknet_transfer::TransferError;

/// Errors produced by a transfer session.
///
/// Only [`ChecksumMismatch`](Self::ChecksumMismatch) is recovered inside a
/// session (by a per-file retry); every other variant aborts it.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("cancelled")]
    Cancelled,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("CRC mismatch on chunk {chunk_id}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        chunk_id: u32,
        expected: u32,
        actual: u32,
    },

    #[error("unsafe destination path: {0}")]
    PathUnsafe(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("file {file_id} failed after {attempts} attempts")]
    RetryExhausted { file_id: String, attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out")]
    Timeout,

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl From<WireError> for DataChannelError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(e) => Self::ConnectionFailed(e.to_string()),
            WireError::UnexpectedEof => Self::ConnectionFailed("connection closed by peer".into()),
            WireError::MalformedFrame(msg) => Self::MalformedFrame(msg),
            WireError::UnknownFrameType(t) => Self::MalformedFrame(format!("unknown frame type {t}")),
            WireError::Json(e) => Self::Protocol(format!("invalid JSON payload: {e}")),
        }
    }
}

impl From<TransferError> for DataChannelError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Io(e) => Self::Io(e),
            TransferError::ChecksumMismatch { expected, actual } => {
                Self::ChecksumMismatch { expected, actual }
            }
            TransferError::InvalidPath(msg) => Self::PathUnsafe(msg),
            TransferError::Ledger(e) => Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            TransferError::Permission(msg) => Self::Io(std::io::Error::other(msg)),
            e @ TransferError::TooManyChunks { .. } => Self::Protocol(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_map_into_taxonomy() {
        assert!(matches!(
            DataChannelError::from(WireError::UnexpectedEof),
            DataChannelError::ConnectionFailed(_)
        ));
        assert!(matches!(
            DataChannelError::from(WireError::UnknownFrameType(9)),
            DataChannelError::MalformedFrame(_)
        ));
        assert!(matches!(
            DataChannelError::from(WireError::MalformedFrame("bad magic".into())),
            DataChannelError::MalformedFrame(_)
        ));
    }

    #[test]
    fn transfer_errors_map_into_taxonomy() {
        assert!(matches!(
            DataChannelError::from(TransferError::InvalidPath("../x".into())),
            DataChannelError::PathUnsafe(_)
        ));
        assert!(matches!(
            DataChannelError::from(TransferError::ChecksumMismatch {
                expected: "a".into(),
                actual: "b".into()
            }),
            DataChannelError::ChecksumMismatch { .. }
        ));
        assert!(matches!(
            DataChannelError::from(TransferError::TooManyChunks {
                size: u64::MAX,
                chunk_size: 1024
            }),
            DataChannelError::Protocol(_)
        ));
    }
}
