//! JSON payloads of the control frames.

use serde::{Deserialize, Serialize};

/// Payload of a `FileHeader` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeaderPayload {
    pub file_id: String,
    /// Destination-relative path with forward slashes.
    pub relative_path: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the whole file.
    pub checksum_sha256: String,
    pub chunk_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_sddl: Option<String>,
}

/// Receiver verdict for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Retry,
}

/// Payload of a `FileAck` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAck {
    pub file_id: String,
    pub status: AckStatus,
}

impl FileAck {
    pub fn ok(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            status: AckStatus::Ok,
        }
    }

    pub fn retry(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            status: AckStatus::Retry,
        }
    }
}

/// Payload of a `ResumeInfo` frame; also the on-disk ledger schema.
///
/// `ranges` are inclusive `[lo, hi]` chunk-id pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub file_id: String,
    pub total_chunks: u32,
    #[serde(default)]
    pub ranges: Vec<(u32, u32)>,
}
