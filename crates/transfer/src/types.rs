use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One file the sender has been asked to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFileEntry {
    /// Opaque, stable identifier.
    pub file_id: String,
    /// Source path on the sending machine (never sent on the wire).
    pub absolute_path: PathBuf,
    /// Destination-relative path with forward slashes.
    pub relative_path: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the full file.
    pub checksum_sha256: String,
    /// Optional Windows security descriptor to apply on the receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_sddl: Option<String>,
}

/// A chunk of plaintext file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index.
    pub id: u32,
    /// Byte offset within the file (`id * chunk_size`).
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// `true` when this chunk ends at the end of the file.
    pub is_last: bool,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
