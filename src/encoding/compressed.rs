//! Block-compressed byte-slice codecs
//!
//! Both codecs take the plain byte-slice layout (count, delta-encoded end
//! offsets, data) and compress it as one block:
//! 1. Delta-encode the cumulative end offsets
//! 2. Concatenate offsets and data
//! 3. Compress with Snappy (raw format) or LZ4 (size prepended)
//!
//! Decoding reverses the compression then the offset delta encoding.

use serde::{Deserialize, Serialize};

use crate::encoding::plain;
use crate::storage::error::{StorageError, StorageResult};

/// Byte compression used for text columns and over-budget keyword columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteCompression {
    #[default]
    Snappy,
    Lz4,
}

impl std::fmt::Display for ByteCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteCompression::Snappy => write!(f, "snappy"),
            ByteCompression::Lz4 => write!(f, "lz4"),
        }
    }
}

impl std::str::FromStr for ByteCompression {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(ByteCompression::Snappy),
            "lz4" => Ok(ByteCompression::Lz4),
            other => Err(StorageError::Config(format!(
                "Unknown byte compression: {}",
                other
            ))),
        }
    }
}

pub fn encode_snappy<T: AsRef<[u8]>>(values: &[T], out: &mut Vec<u8>) -> StorageResult<()> {
    let mut raw = Vec::new();
    plain::encode_bytes(values, &mut raw);
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&raw)
        .map_err(|e| StorageError::Compression(format!("Snappy compression failed: {}", e)))?;
    out.extend_from_slice(&compressed);
    Ok(())
}

/// A snappy copy element expands at most 64 bytes from a 3-byte tag and an
/// LZ4 sequence at most 255 bytes per length byte.
const MAX_SNAPPY_RATIO: usize = 32;
const MAX_LZ4_RATIO: usize = 256;

fn check_claimed_size(codec: &str, claimed: usize, compressed: usize, ratio: usize) -> StorageResult<()> {
    if claimed > compressed.saturating_mul(ratio).saturating_add(64) {
        return Err(StorageError::Corruption(format!(
            "{} block of {} bytes claims {} uncompressed bytes",
            codec, compressed, claimed
        )));
    }
    Ok(())
}

pub fn decode_snappy(payload: &[u8], out: &mut Vec<Vec<u8>>) -> StorageResult<()> {
    let claimed = snap::raw::decompress_len(payload)
        .map_err(|e| StorageError::Compression(format!("Snappy decompression failed: {}", e)))?;
    check_claimed_size("Snappy", claimed, payload.len(), MAX_SNAPPY_RATIO)?;
    let raw = snap::raw::Decoder::new()
        .decompress_vec(payload)
        .map_err(|e| StorageError::Compression(format!("Snappy decompression failed: {}", e)))?;
    plain::decode_bytes(&raw, out)
}

pub fn encode_lz4<T: AsRef<[u8]>>(values: &[T], out: &mut Vec<u8>) {
    let mut raw = Vec::new();
    plain::encode_bytes(values, &mut raw);
    out.extend_from_slice(&lz4_flex::compress_prepend_size(&raw));
}

pub fn decode_lz4(payload: &[u8], out: &mut Vec<Vec<u8>>) -> StorageResult<()> {
    let Some(size) = payload.get(..4) else {
        return Err(StorageError::TruncatedInput {
            needed: 4,
            remaining: payload.len(),
        });
    };
    let claimed = u32::from_le_bytes([size[0], size[1], size[2], size[3]]) as usize;
    check_claimed_size("LZ4", claimed, payload.len() - 4, MAX_LZ4_RATIO)?;
    let raw = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| StorageError::Compression(format!("LZ4 decompression failed: {}", e)))?;
    plain::decode_bytes(&raw, out)
}

/// Size statistics for a compressed column
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CompressionStats {
    pub value_count: usize,
    pub original_size: usize,
    pub compressed_size: usize,
    /// original / compressed
    pub ratio: f64,
}

pub fn compression_stats(value_count: usize, original_size: usize, compressed_size: usize) -> CompressionStats {
    let ratio = if compressed_size > 0 {
        original_size as f64 / compressed_size as f64
    } else {
        0.0
    };
    CompressionStats {
        value_count,
        original_size,
        compressed_size,
        ratio,
    }
}
