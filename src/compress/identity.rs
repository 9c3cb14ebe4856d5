//! Pass-through compressor.

use super::{Compressor, COMPRESSOR_IDENTITY};
use crate::error::Result;

/// Compressor that returns its input unchanged (code 0).
pub struct Identity;

impl Compressor for Identity {
    fn code(&self) -> u8 {
        COMPRESSOR_IDENTITY
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
