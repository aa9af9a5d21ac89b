//! Run-length integer codec
//!
//! Emits a `(zigzag value, uvarint run_length)` pair every time the value
//! changes.

use crate::io::reader::SliceReader;
use crate::io::varint::{put_uvarint, put_varint};
use crate::storage::error::{StorageError, StorageResult};

pub fn encode(values: &[i64], out: &mut Vec<u8>) {
    let mut iter = values.iter().copied();
    let Some(mut current) = iter.next() else {
        return;
    };
    let mut run = 1u64;

    for v in iter {
        if v == current {
            run += 1;
        } else {
            put_varint(out, current);
            put_uvarint(out, run);
            current = v;
            run = 1;
        }
    }
    put_varint(out, current);
    put_uvarint(out, run);
}

/// Expand runs into `out`, failing once more than `limit` values would be
/// produced.
pub fn decode(payload: &[u8], out: &mut Vec<i64>, limit: usize) -> StorageResult<()> {
    let mut reader = SliceReader::new(payload);
    let mut decoded = 0usize;
    while reader.remaining() > 0 {
        let value = reader.read_varint()?;
        let run = reader.read_uvarint()?;
        if run == 0 {
            return Err(StorageError::Corruption("Zero-length run".into()));
        }
        let run = usize::try_from(run)
            .ok()
            .filter(|run| *run <= limit - decoded)
            .ok_or_else(|| {
                StorageError::Corruption(format!(
                    "Run of {} exceeds the {} values left in the page",
                    run,
                    limit - decoded
                ))
            })?;
        out.try_reserve(run)
            .map_err(|e| StorageError::Corruption(format!("Run of {} values: {}", run, e)))?;
        out.extend(std::iter::repeat(value).take(run));
        decoded += run;
    }
    Ok(())
}
