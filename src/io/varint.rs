//! Variable-length integer encoding
//!
//! Unsigned varints use 7 data bits per byte with the high bit as a
//! continuation flag (little-endian groups). Signed values are zigzag mapped
//! first so small negative numbers stay short:
//! `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`
//!
//! Decoding never panics: a buffer that ends mid-varint yields
//! `TruncatedInput`, and a varint longer than ten bytes (or whose tenth byte
//! carries more than the final bit) yields `Overflow`.

use crate::storage::error::{StorageError, StorageResult};

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Map a signed integer onto the unsigned range
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`]
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append an unsigned varint, returning the number of bytes written
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) -> usize {
    let start = buf.len();
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
    buf.len() - start
}

/// Append a zigzag-encoded signed varint
pub fn put_varint(buf: &mut Vec<u8>, value: i64) -> usize {
    put_uvarint(buf, zigzag_encode(value))
}

/// Encode an unsigned varint into a fixed scratch array
pub fn encode_uvarint(mut value: u64, scratch: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        scratch[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    scratch[i] = value as u8;
    i + 1
}

/// Number of bytes `value` occupies as an unsigned varint
pub fn uvarint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decode an unsigned varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn uvarint(buf: &[u8]) -> StorageResult<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(StorageError::Overflow);
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(StorageError::Overflow);
            }
            return Ok((value | (byte as u64) << shift, i + 1));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    if buf.len() >= MAX_VARINT_LEN {
        return Err(StorageError::Overflow);
    }
    Err(StorageError::truncated(buf.len() + 1, buf.len()))
}

/// Decode a zigzag-encoded signed varint from the front of `buf`
pub fn varint(buf: &[u8]) -> StorageResult<(i64, usize)> {
    let (raw, n) = uvarint(buf)?;
    Ok((zigzag_decode(raw), n))
}
