//! Delta-of-delta integer codec
//!
//! Layout:
//! ```text
//! [varint v0][varint v1 - v0][varint (v[i] - v[i-1]) - (v[i-1] - v[i-2])]*
//! ```
//! Near-linear sequences such as event timestamps collapse to runs of
//! one-byte zeros. All arithmetic wraps, so the whole `i64` range round-trips.

use crate::io::reader::SliceReader;
use crate::io::varint::put_varint;
use crate::storage::error::StorageResult;

pub fn encode(values: &[i64], out: &mut Vec<u8>) {
    let Some(&first) = values.first() else {
        return;
    };
    put_varint(out, first);

    let mut prev = first;
    let mut prev_delta = 0i64;
    for (i, &v) in values.iter().enumerate().skip(1) {
        let delta = v.wrapping_sub(prev);
        if i == 1 {
            put_varint(out, delta);
        } else {
            put_varint(out, delta.wrapping_sub(prev_delta));
        }
        prev = v;
        prev_delta = delta;
    }
}

pub fn decode(payload: &[u8], out: &mut Vec<i64>) -> StorageResult<()> {
    let mut reader = SliceReader::new(payload);
    if reader.remaining() == 0 {
        return Ok(());
    }

    let mut prev = reader.read_varint()?;
    out.push(prev);
    if reader.remaining() == 0 {
        return Ok(());
    }

    let mut delta = reader.read_varint()?;
    prev = prev.wrapping_add(delta);
    out.push(prev);

    while reader.remaining() > 0 {
        delta = delta.wrapping_add(reader.read_varint()?);
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_sequence_is_compact() {
        let values: Vec<i64> = (0..1000).map(|i| 1_700_000_000_000 + i * 1000).collect();
        let mut buf = Vec::new();
        encode(&values, &mut buf);
        // first value (6 bytes), first delta (2 bytes), then 998 one-byte zeros
        assert_eq!(buf.len(), 6 + 2 + 998);

        let mut out = Vec::new();
        decode(&buf, &mut out).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_short_inputs() {
        for values in [vec![], vec![42i64], vec![42, -7]] {
            let mut buf = Vec::new();
            encode(&values, &mut buf);
            let mut out = Vec::new();
            decode(&buf, &mut out).unwrap();
            assert_eq!(out, values);
        }
    }

    #[test]
    fn test_extremes_wrap() {
        let values = vec![i64::MIN, i64::MAX, i64::MIN, 0, i64::MAX];
        let mut buf = Vec::new();
        encode(&values, &mut buf);
        let mut out = Vec::new();
        decode(&buf, &mut out).unwrap();
        assert_eq!(out, values);
    }

    proptest! {
        #[test]
        fn prop_double_delta_roundtrip(values in proptest::collection::vec(any::<i64>(), 0..400)) {
            let mut buf = Vec::new();
            encode(&values, &mut buf);
            let mut out = Vec::new();
            decode(&buf, &mut out).unwrap();
            prop_assert_eq!(out, values);
        }
    }

    proptest! {
        #[test]
        fn prop_decode_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let mut out = Vec::new();
            if decode(&bytes, &mut out).is_ok() {
                prop_assert!(out.len() <= bytes.len());
            }
        }
    }
}
