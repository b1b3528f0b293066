//! Fixed 24-byte frame header codec.
//!
//! The codec only serialises and parses headers; payload reads are driven
//! by `payload_size` (see [`crate::io`]).

use serde::Serialize;

use crate::crc::crc32;
use crate::error::WireError;
use crate::{HEADER_LEN, MAGIC, PROTOCOL_VERSION};

/// Frame type byte at offset 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    FileHeader = 1,
    DataChunk = 2,
    FileEnd = 3,
    TransferEnd = 4,
    ResumeInfo = 5,
    FileAck = 6,
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::FileHeader),
            2 => Ok(Self::DataChunk),
            3 => Ok(Self::FileEnd),
            4 => Ok(Self::TransferEnd),
            5 => Ok(Self::ResumeInfo),
            6 => Ok(Self::FileAck),
            other => Err(WireError::UnknownFrameType(other)),
        }
    }
}

/// Frame flag bits (offset 6, big-endian u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FrameFlags(u16);

impl FrameFlags {
    pub const NONE: Self = Self(0);
    pub const ENCRYPTED: Self = Self(0x0001);
    pub const COMPRESSED: Self = Self(0x0002);
    pub const LAST_CHUNK: Self = Self(0x0004);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub flags: FrameFlags,
    /// Zero-based chunk index for `DataChunk`, 0 elsewhere.
    pub chunk_id: u32,
    /// Wire payload bytes (post-compress, post-encrypt).
    pub payload_size: u32,
    /// Original plaintext bytes.
    pub plain_size: u32,
    /// CRC-32 of the plaintext; 0 when unused.
    pub crc32: u32,
}

impl FrameHeader {
    /// Creates an empty header of the given type.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            flags: FrameFlags::NONE,
            chunk_id: 0,
            payload_size: 0,
            plain_size: 0,
            crc32: 0,
        }
    }

    /// Serialises the header into its 24-byte big-endian form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4] = PROTOCOL_VERSION;
        buf[5] = self.frame_type as u8;
        buf[6..8].copy_from_slice(&self.flags.bits().to_be_bytes());
        buf[8..12].copy_from_slice(&self.chunk_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.payload_size.to_be_bytes());
        buf[16..20].copy_from_slice(&self.plain_size.to_be_bytes());
        buf[20..24].copy_from_slice(&self.crc32.to_be_bytes());
        buf
    }

    /// Parses a header, rejecting bad magic, bad version, unknown types and
    /// payloads larger than `max_payload`.
    pub fn decode(bytes: &[u8], max_payload: u32) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::MalformedFrame(format!(
                "short header: {} of {HEADER_LEN} bytes",
                bytes.len()
            )));
        }

        let magic = be_u32(bytes, 0);
        if magic != MAGIC {
            return Err(WireError::MalformedFrame(format!(
                "bad magic 0x{magic:08X}"
            )));
        }

        let version = bytes[4];
        if version != PROTOCOL_VERSION {
            return Err(WireError::MalformedFrame(format!(
                "unsupported version {version}"
            )));
        }

        let frame_type = FrameType::try_from(bytes[5])?;
        let flags = FrameFlags::from_bits(u16::from_be_bytes([bytes[6], bytes[7]]));
        let payload_size = be_u32(bytes, 12);
        if payload_size > max_payload {
            return Err(WireError::MalformedFrame(format!(
                "payload of {payload_size} bytes exceeds cap of {max_payload}"
            )));
        }

        Ok(Self {
            frame_type,
            flags,
            chunk_id: be_u32(bytes, 8),
            payload_size,
            plain_size: be_u32(bytes, 16),
            crc32: be_u32(bytes, 20),
        })
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// A header plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A zero-payload frame (`FileEnd`, `TransferEnd`).
    pub fn empty(frame_type: FrameType) -> Self {
        Self {
            header: FrameHeader::new(frame_type),
            payload: Vec::new(),
        }
    }

    /// A JSON control frame. When `checksummed` is set the CRC covers the
    /// JSON bytes and `plain_size` equals the payload length.
    pub fn json<T: Serialize>(
        frame_type: FrameType,
        value: &T,
        checksummed: bool,
    ) -> Result<Self, WireError> {
        let payload = serde_json::to_vec(value)?;
        let len = payload_len(&payload)?;
        let mut header = FrameHeader::new(frame_type);
        header.payload_size = len;
        if checksummed {
            header.plain_size = len;
            header.crc32 = crc32(&payload);
        }
        Ok(Self { header, payload })
    }

    /// A `DataChunk` frame around an already sealed payload.
    pub fn data_chunk(
        chunk_id: u32,
        flags: FrameFlags,
        payload: Vec<u8>,
        plain_size: u32,
        crc: u32,
    ) -> Result<Self, WireError> {
        let header = FrameHeader {
            frame_type: FrameType::DataChunk,
            flags,
            chunk_id,
            payload_size: payload_len(&payload)?,
            plain_size,
            crc32: crc,
        };
        Ok(Self { header, payload })
    }

    /// Parses the JSON payload, verifying the CRC first when one is present.
    pub fn parse_json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, WireError> {
        if self.header.crc32 != 0 && crc32(&self.payload) != self.header.crc32 {
            return Err(WireError::MalformedFrame(format!(
                "{:?} payload CRC mismatch",
                self.header.frame_type
            )));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

fn payload_len(payload: &[u8]) -> Result<u32, WireError> {
    u32::try_from(payload.len()).map_err(|_| {
        WireError::MalformedFrame(format!("payload of {} bytes too large", payload.len()))
    })
}
