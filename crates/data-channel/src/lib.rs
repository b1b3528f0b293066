//! Encrypted, resumable file transfer over a single TCP stream.
//!
//! A [`TransferSender`] connects to a [`TransferReceiver`] and streams a
//! batch of files as SAKN frames (see `saknet_protocol`). Each chunk is
//! CRC-checked on its plaintext, optionally zlib-compressed and optionally
//! sealed with AES-256-GCM under a PBKDF2-derived key. The receiver writes
//! into `<final>.partial`, tracks completed chunks in a resume ledger,
//! verifies the whole-file SHA-256 and acks each file `ok` or `retry`.
//!
//! # Session
//!
//! ```text
//! Sender                                  Receiver
//!   FileHeader ───────────────────────────▶
//!              ◀─────────────────────────── ResumeInfo   (resume enabled)
//!   DataChunk × n ────────────────────────▶
//!   FileEnd ──────────────────────────────▶
//!              ◀─────────────────────────── FileAck {ok | retry}
//!   ... next file ...
//!   TransferEnd ──────────────────────────▶
//! ```

pub mod channel;
pub mod client;
pub mod compress;
pub mod crypto;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod server;

#[cfg(test)]
mod testing;

pub use client::{SendSummary, TransferSender};
pub use error::DataChannelError;
pub use options::DataOptions;
pub use pipeline::ChunkCodec;
pub use server::{ReceiveSummary, TransferReceiver};

use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the sender's connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the receiver waits for its single connection.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for any single frame read or write.
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the sender waits for a `FileAck` after `FileEnd`.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Attempts per file before the session fails.
pub const MAX_ATTEMPTS: u32 = 3;

/// Emits the closing lifecycle events for a finished session.
pub(crate) fn report_outcome<T>(
    observer: &dyn saknet_transfer::TransferObserver,
    result: &Result<T, DataChannelError>,
    success_message: &str,
) {
    match result {
        Ok(_) => observer.transfer_completed(true, success_message),
        Err(e) => {
            let message = e.to_string();
            tracing::error!(error = %message, "transfer failed");
            observer.error_occurred(&message);
            observer.transfer_completed(false, &message);
        }
    }
}
