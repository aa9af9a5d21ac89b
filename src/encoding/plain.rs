//! Plain codecs
//!
//! - fixed-width: ints/floats as 8-byte little-endian words
//! - varint: zigzag varint per integer
//! - byte slices:
//!   ```text
//!   [uvarint count][uvarint delta(end_offset[i])]*count[concatenated data]
//!   ```
//!   so `value[i] = data[end_offset[i-1]..end_offset[i]]`

use crate::encoding::delta::{delta_decode, delta_encode};
use crate::io::reader::SliceReader;
use crate::io::varint::{put_uvarint, put_varint};
use crate::storage::error::{StorageError, StorageResult};

pub fn encode_i64(values: &[i64], out: &mut Vec<u8>) {
    out.reserve(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn decode_i64(payload: &[u8], out: &mut Vec<i64>) -> StorageResult<()> {
    if payload.len() % 8 != 0 {
        return Err(StorageError::Corruption(format!(
            "Plain int payload of {} bytes is not a multiple of 8",
            payload.len()
        )));
    }
    out.extend(payload.chunks_exact(8).map(|c| {
        i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
    }));
    Ok(())
}

pub fn encode_f64(values: &[f64], out: &mut Vec<u8>) {
    out.reserve(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
}

pub fn decode_f64(payload: &[u8], out: &mut Vec<f64>) -> StorageResult<()> {
    if payload.len() % 8 != 0 {
        return Err(StorageError::Corruption(format!(
            "Plain float payload of {} bytes is not a multiple of 8",
            payload.len()
        )));
    }
    out.extend(payload.chunks_exact(8).map(|c| {
        f64::from_bits(u64::from_le_bytes([
            c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
        ]))
    }));
    Ok(())
}

pub fn encode_varint_i64(values: &[i64], out: &mut Vec<u8>) {
    for &v in values {
        put_varint(out, v);
    }
}

pub fn decode_varint_i64(payload: &[u8], out: &mut Vec<i64>) -> StorageResult<()> {
    let mut reader = SliceReader::new(payload);
    while reader.remaining() > 0 {
        out.push(reader.read_varint()?);
    }
    Ok(())
}

pub fn encode_bytes<T: AsRef<[u8]>>(values: &[T], out: &mut Vec<u8>) {
    let mut ends = Vec::with_capacity(values.len());
    let mut end = 0u64;
    for v in values {
        end += v.as_ref().len() as u64;
        ends.push(end);
    }

    let mut deltas = Vec::with_capacity(ends.len());
    delta_encode(&ends, &mut deltas);

    put_uvarint(out, values.len() as u64);
    for d in deltas {
        put_uvarint(out, d);
    }
    out.reserve(end as usize);
    for v in values {
        out.extend_from_slice(v.as_ref());
    }
}

pub fn decode_bytes(payload: &[u8], out: &mut Vec<Vec<u8>>) -> StorageResult<()> {
    let mut reader = SliceReader::new(payload);
    let count = reader.read_uvarint()? as usize;
    // every offset takes at least one byte
    if count > reader.remaining() {
        return Err(StorageError::Corruption(format!(
            "Byte-slice count {} exceeds payload of {} bytes",
            count,
            payload.len()
        )));
    }

    let mut ends = Vec::with_capacity(count);
    for _ in 0..count {
        ends.push(reader.read_uvarint()?);
    }
    delta_decode(&mut ends);

    let data = reader.read_slice(reader.remaining())?;
    if ends.last().copied().unwrap_or(0) != data.len() as u64 {
        return Err(StorageError::Corruption(format!(
            "Byte-slice offsets end at {} but data holds {} bytes",
            ends.last().copied().unwrap_or(0),
            data.len()
        )));
    }

    out.reserve(count);
    let mut start = 0usize;
    for end in ends {
        if end < start as u64 || end > data.len() as u64 {
            return Err(StorageError::Corruption(format!(
                "Byte-slice offset {} outside {}..={}",
                end,
                start,
                data.len()
            )));
        }
        let end = end as usize;
        out.push(data[start..end].to_vec());
        start = end;
    }
    Ok(())
}
