//! Chunk payload pipeline: CRC → compress → encrypt, and back.

use saknet_protocol::{Frame, FrameFlags, crc32};

use crate::compress::{compress, decompress};
use crate::crypto::SessionCipher;
use crate::error::DataChannelError;
use crate::options::DataOptions;

/// Turns plaintext chunks into `DataChunk` frames and back for one
/// session.
pub struct ChunkCodec {
    cipher: Option<SessionCipher>,
    compression: bool,
}

impl ChunkCodec {
    pub fn new(cipher: Option<SessionCipher>, compression: bool) -> Self {
        Self {
            cipher,
            compression,
        }
    }

    /// Builds the codec for `options`, deriving the key off the runtime
    /// threads when encryption is enabled.
    pub async fn from_options(options: &DataOptions) -> Result<Self, DataChannelError> {
        let cipher = if options.encryption_enabled {
            let passphrase = options.passphrase.clone();
            let salt = options.salt.clone();
            let transfer_id = options.transfer_id.clone();
            let cipher = tokio::task::spawn_blocking(move || {
                SessionCipher::from_passphrase(&passphrase, &salt, &transfer_id)
            })
            .await
            .map_err(|e| DataChannelError::Crypto(format!("key derivation task failed: {e}")))??;
            Some(cipher)
        } else {
            None
        };
        Ok(Self::new(cipher, options.compression_enabled))
    }

    /// Seals one plaintext chunk into a `DataChunk` frame.
    ///
    /// The CRC covers `plaintext`; `COMPRESSED` and `ENCRYPTED` are set
    /// exactly when the stage ran.
    pub fn seal(&self, chunk_id: u32, plaintext: &[u8], is_last: bool) -> Result<Frame, DataChannelError> {
        let plain_size = u32::try_from(plaintext.len())
            .map_err(|_| DataChannelError::Protocol(format!("chunk of {} bytes too large", plaintext.len())))?;
        let crc = crc32(plaintext);

        let mut flags = FrameFlags::NONE;
        if is_last {
            flags.insert(FrameFlags::LAST_CHUNK);
        }

        let mut payload = if self.compression {
            flags.insert(FrameFlags::COMPRESSED);
            compress(plaintext)?
        } else {
            plaintext.to_vec()
        };

        if let Some(cipher) = &self.cipher {
            flags.insert(FrameFlags::ENCRYPTED);
            payload = cipher.seal(&payload)?;
        }

        Ok(Frame::data_chunk(chunk_id, flags, payload, plain_size, crc)?)
    }

    /// Opens a `DataChunk` frame: decrypt, decompress, then verify
    /// length and CRC against the header.
    pub fn open(&self, frame: &Frame) -> Result<Vec<u8>, DataChannelError> {
        let header = &frame.header;
        let encrypted = header.flags.contains(FrameFlags::ENCRYPTED);

        let payload = match (&self.cipher, encrypted) {
            (Some(cipher), true) => cipher.open(&frame.payload)?,
            (None, false) => frame.payload.clone(),
            (None, true) => {
                return Err(DataChannelError::Crypto(format!(
                    "chunk {} is encrypted but this session has no key",
                    header.chunk_id
                )));
            }
            (Some(_), false) => {
                return Err(DataChannelError::Protocol(format!(
                    "chunk {} arrived unencrypted on an encrypted session",
                    header.chunk_id
                )));
            }
        };

        let plaintext = if header.flags.contains(FrameFlags::COMPRESSED) {
            decompress(&payload, header.plain_size as usize)?
        } else {
            payload
        };

        if plaintext.len() != header.plain_size as usize {
            return Err(DataChannelError::MalformedFrame(format!(
                "chunk {} carries {} bytes, header says {}",
                header.chunk_id,
                plaintext.len(),
                header.plain_size
            )));
        }

        let actual = crc32(&plaintext);
        if actual != header.crc32 {
            return Err(DataChannelError::CrcMismatch {
                chunk_id: header.chunk_id,
                expected: header.crc32,
                actual,
            });
        }

        Ok(plaintext)
    }
}

impl std::fmt::Debug for ChunkCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCodec")
            .field("encryption", &self.cipher.is_some())
            .field("compression", &self.compression)
            .finish()
    }
}
