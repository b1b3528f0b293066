//! SAKN wire protocol for the network file-transfer core.
//!
//! # Wire format
//!
//! Every frame is a fixed 24-byte big-endian header followed by
//! `payload_size` bytes of payload:
//!
//! ```text
//! [4 magic 'SAKN'][1 version][1 frame_type][2 flags]
//! [4 chunk_id][4 payload_size][4 plain_size][4 crc32]
//! ```
//!
//! `FileHeader`, `ResumeInfo` and `FileAck` carry compact JSON (see
//! [`messages`]); `DataChunk` carries raw, possibly compressed and then
//! encrypted bytes; `FileEnd` and `TransferEnd` are empty.

pub mod crc;
pub mod error;
pub mod frame;
pub mod io;
pub mod messages;

pub use crc::crc32;
pub use error::WireError;
pub use frame::{Frame, FrameFlags, FrameHeader, FrameType};
pub use messages::{AckStatus, FileAck, FileHeaderPayload, ResumeInfo};

/// Frame magic: ASCII `SAKN`.
pub const MAGIC: u32 = 0x5341_4B4E;

/// The only protocol version producers emit.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 24;

/// Default per-frame payload cap (32 MiB).
pub const DEFAULT_MAX_PAYLOAD: u32 = 32 * 1024 * 1024;
