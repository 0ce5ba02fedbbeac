//! Gzip helpers for HTTP bodies.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{Result, VigilError};

/// Gzip-compress `data`.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| VigilError::CompressionFailed { reason: e.to_string() })?;
    encoder.finish().map_err(|e| VigilError::CompressionFailed { reason: e.to_string() })
}

/// Largest payload [`gunzip`] will inflate.
pub const MAX_DECOMPRESSED_BYTES: usize = 16 * 1024 * 1024;

/// Decompress a gzip stream of at most [`MAX_DECOMPRESSED_BYTES`].
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    gunzip_bounded(data, MAX_DECOMPRESSED_BYTES)
}

/// Decompress a gzip stream, failing once the output passes `limit` bytes.
pub fn gunzip_bounded(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::with_capacity((data.len() * 2).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VigilError::CompressionFailed { reason: e.to_string() })?;
    if out.len() > limit {
        return Err(VigilError::CompressionFailed {
            reason: format!("decompressed payload exceeds {limit} bytes"),
        });
    }
    Ok(out)
}
