//! CRC-32 (IEEE 802.3, reflected polynomial `0xEDB88320`).
//!
//! Initial value and final XOR are both all-ones. Data chunks are
//! checksummed over their plaintext, before compression and encryption.

/// Computes the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let a = crc32(b"helloworld");
        let b = crc32(b"hellowormd");
        assert_ne!(a, b);
    }
}
