//! Session options shared by both peers.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use saknet_protocol::DEFAULT_MAX_PAYLOAD;
use saknet_transfer::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, PermissionMode};
use serde::{Deserialize, Serialize};

use crate::compress::compress_bound;
use crate::crypto::SEAL_OVERHEAD;
use crate::error::DataChannelError;

/// Minimum salt length for key derivation.
pub const MIN_SALT_LEN: usize = 16;

/// Options for one transfer session; must match on both peers except
/// for the receiver-only fields.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataOptions {
    /// Session identifier, bound into every sealed chunk as AEAD data.
    pub transfer_id: String,
    pub encryption_enabled: bool,
    pub compression_enabled: bool,
    pub resume_enabled: bool,
    /// Sender chunk size in bytes.
    pub chunk_size: u32,
    /// Initial sender bandwidth cap in KiB/s (0 = unlimited).
    pub max_bandwidth_kbps: u32,
    /// Never sent over the wire.
    pub passphrase: String,
    pub salt: Vec<u8>,
    /// Receiver only: root all relative paths resolve under.
    pub destination_base: PathBuf,
    /// Receiver only: expected batch size for overall progress.
    pub total_bytes: u64,
    /// Receiver only: first path segment → mode.
    pub permission_modes: HashMap<String, PermissionMode>,
    /// Receiver only: relative path → SDDL.
    pub acl_overrides: HashMap<String, String>,
    /// Per-frame payload cap applied when reading.
    pub max_frame_payload: u32,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            transfer_id: String::new(),
            encryption_enabled: true,
            compression_enabled: true,
            resume_enabled: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_bandwidth_kbps: 0,
            passphrase: String::new(),
            salt: Vec::new(),
            destination_base: PathBuf::from("."),
            total_bytes: 0,
            permission_modes: HashMap::new(),
            acl_overrides: HashMap::new(),
            max_frame_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl DataOptions {
    /// Checks the invariants both state machines rely on.
    pub fn validate(&self) -> Result<(), DataChannelError> {
        validate_chunk_size(self.chunk_size)?;

        if self.encryption_enabled {
            if self.passphrase.is_empty() {
                return Err(DataChannelError::InvalidOptions(
                    "encryption requires a passphrase".into(),
                ));
            }
            if self.salt.len() < MIN_SALT_LEN {
                return Err(DataChannelError::InvalidOptions(format!(
                    "salt must be at least {MIN_SALT_LEN} bytes, got {}",
                    self.salt.len()
                )));
            }
        }

        let mut needed = u64::from(self.chunk_size);
        if self.compression_enabled {
            needed = compress_bound(needed);
        }
        if self.encryption_enabled {
            needed += SEAL_OVERHEAD as u64;
        }
        if u64::from(self.max_frame_payload) < needed {
            return Err(DataChannelError::InvalidOptions(format!(
                "max_frame_payload {} cannot carry a {}-byte chunk",
                self.max_frame_payload, self.chunk_size
            )));
        }

        Ok(())
    }
}

/// Rejects chunk sizes outside 1 KiB..=16 MiB.
pub fn validate_chunk_size(chunk_size: u32) -> Result<(), DataChannelError> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(DataChannelError::InvalidOptions(format!(
            "chunk size {chunk_size} outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

impl fmt::Debug for DataOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataOptions")
            .field("transfer_id", &self.transfer_id)
            .field("encryption_enabled", &self.encryption_enabled)
            .field("compression_enabled", &self.compression_enabled)
            .field("resume_enabled", &self.resume_enabled)
            .field("chunk_size", &self.chunk_size)
            .field("max_bandwidth_kbps", &self.max_bandwidth_kbps)
            .field("passphrase", &"<redacted>")
            .field("salt_len", &self.salt.len())
            .field("destination_base", &self.destination_base)
            .field("total_bytes", &self.total_bytes)
            .field("permission_modes", &self.permission_modes)
            .field("acl_overrides", &self.acl_overrides)
            .field("max_frame_payload", &self.max_frame_payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DataOptions {
        DataOptions {
            transfer_id: "t".into(),
            passphrase: "pw".into(),
            salt: vec![0u8; 16],
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let o = DataOptions::default();
        assert!(o.encryption_enabled && o.compression_enabled && o.resume_enabled);
        assert_eq!(o.chunk_size, 64 * 1024);
        assert_eq!(o.max_bandwidth_kbps, 0);
        assert_eq!(o.max_frame_payload, 32 * 1024 * 1024);
    }

    #[test]
    fn valid_options_pass() {
        valid().validate().unwrap();
    }

    #[test]
    fn chunk_size_bounds() {
        let mut o = valid();
        o.chunk_size = 1023;
        assert!(o.validate().is_err());
        o.chunk_size = 1024;
        assert!(o.validate().is_ok());
        o.chunk_size = 16 * 1024 * 1024;
        assert!(o.validate().is_ok());
        o.chunk_size = 16 * 1024 * 1024 + 1;
        assert!(o.validate().is_err());
    }

    #[test]
    fn encryption_needs_secret_material() {
        let mut o = valid();
        o.salt = vec![0u8; 15];
        assert!(matches!(o.validate(), Err(DataChannelError::InvalidOptions(_))));

        let mut o = valid();
        o.passphrase.clear();
        assert!(o.validate().is_err());

        o.encryption_enabled = false;
        o.salt.clear();
        assert!(o.validate().is_ok());
    }

    #[test]
    fn frame_cap_must_fit_a_sealed_chunk() {
        let mut o = valid();
        o.compression_enabled = false;
        o.max_frame_payload = o.chunk_size;
        assert!(o.validate().is_err());
        o.max_frame_payload = o.chunk_size + 28;
        assert!(o.validate().is_ok());

        // Incompressible chunks may grow under zlib.
        o.compression_enabled = true;
        assert!(o.validate().is_err());
    }

    #[test]
    fn debug_redacts_passphrase() {
        let rendered = format!("{:?}", valid());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"pw\""));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let o: DataOptions =
            serde_json::from_str(r#"{"transfer_id":"t","permission_modes":{"home":"hybrid"}}"#)
                .unwrap();
        assert_eq!(o.chunk_size, 64 * 1024);
        assert_eq!(o.permission_modes["home"], PermissionMode::Hybrid);
    }
}
