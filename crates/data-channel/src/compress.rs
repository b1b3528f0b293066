//! zlib compression of chunk payloads.
//!
//! CPU-bound; chunks are at most 16 MiB so callers run these inline.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::DataChannelError;

/// zlib level used for every chunk.
pub const COMPRESSION_LEVEL: u32 = 6;

/// Worst-case zlib output size for `len` input bytes.
pub fn compress_bound(len: u64) -> u64 {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// Compresses `data` with a zlib wrapper at [`COMPRESSION_LEVEL`].
pub fn compress(data: &[u8]) -> Result<Vec<u8>, DataChannelError> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2 + 64),
        Compression::new(COMPRESSION_LEVEL),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflates a zlib stream, refusing to produce more than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>, DataChannelError> {
    let mut out = Vec::with_capacity(limit);
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DataChannelError::MalformedFrame(format!("zlib decompress: {e}")))?;
    if out.len() > limit {
        return Err(DataChannelError::MalformedFrame(format!(
            "decompressed chunk exceeds {limit} bytes"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_shrink() {
        let data = vec![0u8; 65_536];
        let packed = compress(&data).unwrap();
        assert!(packed.len() < 1_024);
        assert_eq!(decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn output_is_zlib_wrapped() {
        let packed = compress(b"helloworld").unwrap();
        // CMF byte for deflate with a 32K window.
        assert_eq!(packed[0], 0x78);
        assert_eq!(decompress(&packed, 10).unwrap(), b"helloworld");
    }

    #[test]
    fn incompressible_stays_within_bound() {
        let data: Vec<u8> = (0..65_536u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let packed = compress(&data).unwrap();
        assert!(packed.len() as u64 <= compress_bound(data.len() as u64));
    }

    #[test]
    fn limit_is_enforced() {
        let packed = compress(&[7u8; 4_096]).unwrap();
        assert!(decompress(&packed, 4_095).is_err());
        assert!(decompress(&packed, 4_096).is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            decompress(b"definitely not zlib", 1_024),
            Err(DataChannelError::MalformedFrame(_))
        ));
    }
}
