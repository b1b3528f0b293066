//! File-side building blocks of the network transfer core.
//!
//! Everything here is independent of the socket: chunked reads on the
//! sender, `.partial` files and the resume ledger on the receiver, the
//! destination path gate, bandwidth pacing, permission application and
//! progress reporting.

mod chunked;
mod ledger;
mod permissions;
mod progress;
mod throttle;
mod types;
mod validation;

pub use chunked::{
    ChunkReader, PartialFile, calculate_file_checksum, checksum_bytes, chunk_count,
    finalize_partial, ledger_path_for, partial_path_for,
};
pub use ledger::{ChunkRanges, LEDGER_SAVE_INTERVAL, ResumeLedger, SaveThrottle};
pub use permissions::{PermissionAction, PermissionMode, apply_permissions, resolve_permission_action};
pub use progress::{ChannelObserver, NoopObserver, SpeedCalculator, TransferEvent, TransferObserver};
pub use throttle::{BandwidthLimit, BandwidthRegulator, pacing_delay};
pub use types::{Chunk, TransferFileEntry};
pub use validation::{resolve_destination, validate_upload_path};

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Smallest accepted chunk size (1 KiB).
pub const MIN_CHUNK_SIZE: u32 = 1024;

/// Largest accepted chunk size (16 MiB).
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] serde_json::Error),

    #[error("permission error: {0}")]
    Permission(String),

    #[error("{size} bytes in {chunk_size}-byte chunks exceeds the chunk id range")]
    TooManyChunks { size: u64, chunk_size: u32 },
}
