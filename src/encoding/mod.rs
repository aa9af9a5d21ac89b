//! Column encoders/decoders
//!
//! Every page payload is one framed block:
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ uvarint block_length │ payload (codec specific)    │
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! | Kind        | Types        | Payload                                   |
//! |-------------|--------------|-------------------------------------------|
//! | Plain       | int/float/bytes | LE words, or offsets + data            |
//! | Varint      | int          | zigzag varint per value                   |
//! | Rle         | int          | (zigzag value, uvarint run) pairs         |
//! | DoubleDelta | int          | first, first delta, second differences    |
//! | Dictionary  | bytes        | uvarint ids into the column dictionary    |
//! | Snappy      | bytes        | snappy-compressed plain byte layout       |
//! | Xor         | float        | Gorilla bit stream                        |
//! | Lz4         | bytes        | lz4-compressed plain byte layout          |
//!
//! Decoders clear the caller's buffer, fill it and hand back the filled
//! slice.

pub mod bits;
pub mod compressed;
pub mod delta;
pub mod dictionary;
pub mod double_delta;
pub mod plain;
pub mod rle;
pub mod xor;

use std::collections::HashSet;

use serde::Serialize;

pub use compressed::ByteCompression;
pub use dictionary::{Dictionary, DictionaryEncoder, DEFAULT_DICTIONARY_BUDGET};

/// Upper bound on values in one page; decoders refuse to expand past it
pub const MAX_PAGE_VALUES: usize = 1 << 20;

use crate::io::reader::SliceReader;
use crate::io::varint::put_uvarint;
use crate::storage::error::{StorageError, StorageResult};

/// Encoding tag stored in page headers and the segment `info` file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EncodingKind {
    Plain = 0,
    Varint = 1,
    Rle = 2,
    DoubleDelta = 3,
    Dictionary = 4,
    Snappy = 5,
    Xor = 6,
    Lz4 = 7,
}

impl TryFrom<u8> for EncodingKind {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EncodingKind::Plain),
            1 => Ok(EncodingKind::Varint),
            2 => Ok(EncodingKind::Rle),
            3 => Ok(EncodingKind::DoubleDelta),
            4 => Ok(EncodingKind::Dictionary),
            5 => Ok(EncodingKind::Snappy),
            6 => Ok(EncodingKind::Xor),
            7 => Ok(EncodingKind::Lz4),
            _ => Err(StorageError::Corruption(format!(
                "Unknown encoding kind: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EncodingKind::Plain => "plain",
            EncodingKind::Varint => "varint",
            EncodingKind::Rle => "rle",
            EncodingKind::DoubleDelta => "double_delta",
            EncodingKind::Dictionary => "dictionary",
            EncodingKind::Snappy => "snappy",
            EncodingKind::Xor => "xor",
            EncodingKind::Lz4 => "lz4",
        };
        write!(f, "{}", name)
    }
}

impl From<ByteCompression> for EncodingKind {
    fn from(c: ByteCompression) -> Self {
        match c {
            ByteCompression::Snappy => EncodingKind::Snappy,
            ByteCompression::Lz4 => EncodingKind::Lz4,
        }
    }
}

fn unsupported(kind: EncodingKind, what: &str) -> StorageError {
    StorageError::Encoding(format!("{} encoding does not apply to {} values", kind, what))
}

/// Append `[uvarint len][payload]` to `out`
pub fn frame(payload: &[u8], out: &mut Vec<u8>) {
    put_uvarint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

/// Strip the length prefix, checking it against the block
pub fn unframe(block: &[u8]) -> StorageResult<&[u8]> {
    let mut reader = SliceReader::new(block);
    let len = reader.read_uvarint()? as usize;
    if len != reader.remaining() {
        return Err(StorageError::Corruption(format!(
            "Block declares {} payload bytes but holds {}",
            len,
            reader.remaining()
        )));
    }
    reader.read_slice(len)
}

pub fn encode_ints(kind: EncodingKind, values: &[i64], out: &mut Vec<u8>) -> StorageResult<()> {
    let mut payload = Vec::new();
    match kind {
        EncodingKind::Plain => plain::encode_i64(values, &mut payload),
        EncodingKind::Varint => plain::encode_varint_i64(values, &mut payload),
        EncodingKind::Rle => rle::encode(values, &mut payload),
        EncodingKind::DoubleDelta => double_delta::encode(values, &mut payload),
        other => return Err(unsupported(other, "integer")),
    }
    frame(&payload, out);
    Ok(())
}

pub fn decode_ints<'a>(
    kind: EncodingKind,
    block: &[u8],
    out: &'a mut Vec<i64>,
) -> StorageResult<&'a [i64]> {
    out.clear();
    let payload = unframe(block)?;
    match kind {
        EncodingKind::Plain => plain::decode_i64(payload, out)?,
        EncodingKind::Varint => plain::decode_varint_i64(payload, out)?,
        EncodingKind::Rle => rle::decode(payload, out, MAX_PAGE_VALUES)?,
        EncodingKind::DoubleDelta => double_delta::decode(payload, out)?,
        other => return Err(unsupported(other, "integer")),
    }
    Ok(out.as_slice())
}

pub fn encode_floats(kind: EncodingKind, values: &[f64], out: &mut Vec<u8>) -> StorageResult<()> {
    let mut payload = Vec::new();
    match kind {
        EncodingKind::Plain => plain::encode_f64(values, &mut payload),
        EncodingKind::Xor => xor::encode(values, &mut payload)?,
        other => return Err(unsupported(other, "float")),
    }
    frame(&payload, out);
    Ok(())
}

pub fn decode_floats<'a>(
    kind: EncodingKind,
    block: &[u8],
    out: &'a mut Vec<f64>,
) -> StorageResult<&'a [f64]> {
    out.clear();
    let payload = unframe(block)?;
    match kind {
        EncodingKind::Plain => plain::decode_f64(payload, out)?,
        EncodingKind::Xor => xor::decode(payload, out)?,
        other => return Err(unsupported(other, "float")),
    }
    Ok(out.as_slice())
}

/// Encode byte slices; `Dictionary` needs the column's encoder
pub fn encode_bytes<T: AsRef<[u8]>>(
    kind: EncodingKind,
    values: &[T],
    dictionary: Option<&mut DictionaryEncoder>,
    out: &mut Vec<u8>,
) -> StorageResult<()> {
    let mut payload = Vec::new();
    match kind {
        EncodingKind::Plain => plain::encode_bytes(values, &mut payload),
        EncodingKind::Snappy => compressed::encode_snappy(values, &mut payload)?,
        EncodingKind::Lz4 => compressed::encode_lz4(values, &mut payload),
        EncodingKind::Dictionary => match dictionary {
            Some(encoder) => encoder.encode(values, &mut payload)?,
            None => {
                return Err(StorageError::Encoding(
                    "Dictionary encoding requires a dictionary".into(),
                ))
            }
        },
        other => return Err(unsupported(other, "byte-slice")),
    }
    frame(&payload, out);
    Ok(())
}

pub fn decode_bytes<'a>(
    kind: EncodingKind,
    block: &[u8],
    dictionary: Option<&Dictionary>,
    out: &'a mut Vec<Vec<u8>>,
) -> StorageResult<&'a [Vec<u8>]> {
    out.clear();
    let payload = unframe(block)?;
    match kind {
        EncodingKind::Plain => plain::decode_bytes(payload, out)?,
        EncodingKind::Snappy => compressed::decode_snappy(payload, out)?,
        EncodingKind::Lz4 => compressed::decode_lz4(payload, out)?,
        EncodingKind::Dictionary => match dictionary {
            Some(dictionary) => dictionary.decode(payload, out)?,
            None => {
                return Err(StorageError::Corruption(
                    "Dictionary-encoded page without a dictionary".into(),
                ))
            }
        },
        other => return Err(unsupported(other, "byte-slice")),
    }
    Ok(out.as_slice())
}

/// Rle for low-cardinality integer columns, Varint otherwise
pub fn select_int_encoding(values: &[i64], rle_distinct_threshold: usize) -> EncodingKind {
    let mut seen = HashSet::new();
    for v in values {
        seen.insert(*v);
        if seen.len() > rle_distinct_threshold {
            return EncodingKind::Varint;
        }
    }
    EncodingKind::Rle
}

/// Xor unless the column holds a NaN, which only Plain can store
pub fn select_float_encoding(values: &[f64]) -> EncodingKind {
    if values.iter().any(|v| v.is_nan()) {
        EncodingKind::Plain
    } else {
        EncodingKind::Xor
    }
}

/// Dictionary while the distinct count fits the budget
pub fn select_keyword_encoding<T: AsRef<[u8]>>(
    values: &[T],
    budget: usize,
    fallback: ByteCompression,
) -> EncodingKind {
    let mut seen: HashSet<&[u8]> = HashSet::new();
    for v in values {
        seen.insert(v.as_ref());
        if seen.len() > budget {
            return fallback.into();
        }
    }
    EncodingKind::Dictionary
}
