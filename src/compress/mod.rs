//! Body compression.
//!
//! Compressors are identified on the wire by a one-byte code in the
//! request header. The [`CompressorRegistry`] maps codes to
//! implementations; identity (code 0) is always present. Codes 128-255
//! are reserved for user extensions. Response bodies are never
//! compressed; the response header carries no compressor code.

mod gzip;
mod identity;

use std::collections::HashMap;
use std::sync::Arc;

pub use gzip::Gzip;
pub use identity::Identity;

use crate::error::{Result, RpcError};

/// Code of the identity (pass-through) compressor.
pub const COMPRESSOR_IDENTITY: u8 = 0;

/// Code of the gzip compressor.
pub const COMPRESSOR_GZIP: u8 = 1;

/// A body compressor.
pub trait Compressor: Send + Sync {
    /// Wire code identifying this compressor.
    fn code(&self) -> u8;

    /// Compress `data`.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Registry of compressors keyed by their wire code.
///
/// Construction pre-registers [`Identity`]; it must always be resolvable
/// on both ends of a connection.
#[derive(Clone)]
pub struct CompressorRegistry {
    by_code: HashMap<u8, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// Registry holding only the identity compressor.
    pub fn new() -> Self {
        let mut registry = Self {
            by_code: HashMap::new(),
        };
        registry.register(Arc::new(Identity));
        registry
    }

    /// Register `compressor` under its own code, replacing any previous
    /// entry for that code.
    pub fn register(&mut self, compressor: Arc<dyn Compressor>) {
        self.by_code.insert(compressor.code(), compressor);
    }

    /// Look up the compressor for `code`.
    pub fn get(&self, code: u8) -> Result<&Arc<dyn Compressor>> {
        self.by_code
            .get(&code)
            .ok_or(RpcError::UnknownCompressor(code))
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
