//! PBKDF2-HMAC-SHA256 key derivation and AES-256-GCM chunk sealing.
//!
//! Sealed layout: `[12-byte nonce][16-byte tag][ciphertext]`. The nonce is
//! fresh random bytes for every chunk; the associated data is the
//! session's `transfer_id`.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rand::Rng;
use sha2::Sha256;

use crate::error::DataChannelError;

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 200_000;

/// Derived key length (AES-256).
pub const KEY_LEN: usize = 32;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Bytes a sealed payload adds to its plaintext.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Derives the session key from a passphrase and salt.
///
/// Deterministic and CPU-heavy; async callers should run it on
/// `spawn_blocking`.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, KDF_ITERATIONS, &mut key);
    key
}

/// AES-256-GCM bound to one session's associated data.
pub struct SessionCipher {
    cipher: Aes256Gcm,
    aad: Vec<u8>,
}

impl SessionCipher {
    pub fn new(key: &[u8; KEY_LEN], transfer_id: &str) -> Result<Self, DataChannelError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| DataChannelError::Crypto(format!("invalid key: {e}")))?;
        Ok(Self {
            cipher,
            aad: transfer_id.as_bytes().to_vec(),
        })
    }

    /// Derives the key and builds the cipher in one step.
    pub fn from_passphrase(
        passphrase: &str,
        salt: &[u8],
        transfer_id: &str,
    ) -> Result<Self, DataChannelError> {
        Self::new(&derive_key(passphrase, salt), transfer_id)
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, DataChannelError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);

        let mut buf = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), &self.aad, &mut buf)
            .map_err(|_| DataChannelError::Crypto("encryption failed".into()))?;

        let mut out = Vec::with_capacity(SEAL_OVERHEAD + buf.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&buf);
        Ok(out)
    }

    /// Verifies and decrypts a sealed payload.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, DataChannelError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(DataChannelError::Crypto(format!(
                "sealed payload of {} bytes is shorter than nonce and tag",
                sealed.len()
            )));
        }
        let (nonce, rest) = sealed.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut buf = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                &self.aad,
                &mut buf,
                Tag::from_slice(tag),
            )
            .map_err(|_| DataChannelError::Crypto("authentication tag mismatch".into()))?;
        Ok(buf)
    }
}
