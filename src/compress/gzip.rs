//! Gzip compressor backed by flate2.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Compressor, COMPRESSOR_GZIP};
use crate::error::{Result, RpcError};

/// Gzip compressor (code 1).
pub struct Gzip;

impl Compressor for Gzip {
    fn code(&self) -> u8 {
        COMPRESSOR_GZIP
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(RpcError::Compression)?;
        // finish flushes the trailer; without it the stream is unreadable.
        encoder.finish().map_err(RpcError::Compression)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(RpcError::Compression)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"a reasonably repetitive payload payload payload payload";
        let compressed = Gzip.compress(data).unwrap();
        assert_ne!(compressed, data.to_vec());
        assert_eq!(Gzip.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = Gzip.compress(b"").unwrap();
        assert_eq!(Gzip.decompress(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn garbage_input_fails_decompress() {
        assert!(matches!(
            Gzip.decompress(b"definitely not gzip"),
            Err(RpcError::Compression(_))
        ));
    }
}
