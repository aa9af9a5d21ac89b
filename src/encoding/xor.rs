//! XOR float codec (Gorilla-style)
//!
//! ```text
//! first value:        64 raw bits
//! xor == 0:           '0'
//! xor fits window:    '10' + meaningful bits of the previous window
//! new window:         '11' + 5 bits leading zeros (max 31)
//!                          + 6 bits significant length (0 means 64)
//!                          + significant bits
//! end of stream:      the value u64::MAX (a NaN) followed by a '0' bit
//! ```
//! NaN cannot be encoded since every NaN payload could collide with the end
//! marker.

use crate::encoding::bits::{BitReader, BitWriter};
use crate::storage::error::{StorageError, StorageResult};

const END_MARKER: u64 = u64::MAX;
const MAX_LEADING: u32 = 31;

#[derive(Debug, Clone, Copy)]
struct Window {
    leading: u32,
    trailing: u32,
}

struct XorEncoder {
    bits: BitWriter,
    prev: u64,
    window: Option<Window>,
}

impl XorEncoder {
    fn new(first: u64) -> Self {
        let mut bits = BitWriter::new();
        bits.write_bits(first, 64);
        Self {
            bits,
            prev: first,
            window: None,
        }
    }

    fn push(&mut self, value: u64) {
        let xor = self.prev ^ value;
        self.prev = value;

        if xor == 0 {
            self.bits.write_bit(false);
            return;
        }
        self.bits.write_bit(true);

        let leading = xor.leading_zeros().min(MAX_LEADING);
        let trailing = xor.trailing_zeros();

        if let Some(w) = self.window {
            if leading >= w.leading && trailing >= w.trailing {
                self.bits.write_bit(false);
                let significant = 64 - w.leading - w.trailing;
                self.bits.write_bits(xor >> w.trailing, significant);
                return;
            }
        }

        let significant = 64 - leading - trailing;
        self.bits.write_bit(true);
        self.bits.write_bits(leading as u64, 5);
        // 64 does not fit in 6 bits; 0 is never a valid length otherwise
        self.bits.write_bits((significant & 0x3f) as u64, 6);
        self.bits.write_bits(xor >> trailing, significant);
        self.window = Some(Window { leading, trailing });
    }

    fn finish(mut self) -> Vec<u8> {
        self.push(END_MARKER);
        self.bits.write_bit(false);
        self.bits.into_bytes()
    }
}

pub fn encode(values: &[f64], out: &mut Vec<u8>) -> StorageResult<()> {
    if let Some(pos) = values.iter().position(|v| v.is_nan()) {
        return Err(StorageError::Encoding(format!(
            "NaN at position {} cannot be XOR-encoded",
            pos
        )));
    }
    let Some(first) = values.first() else {
        return Ok(());
    };

    let mut encoder = XorEncoder::new(first.to_bits());
    for v in &values[1..] {
        encoder.push(v.to_bits());
    }
    out.extend_from_slice(&encoder.finish());
    Ok(())
}

pub fn decode(payload: &[u8], out: &mut Vec<f64>) -> StorageResult<()> {
    if payload.is_empty() {
        return Ok(());
    }

    let mut bits = BitReader::new(payload);
    let mut prev = bits.read_bits(64)?;
    if prev == END_MARKER {
        return Ok(());
    }
    out.push(f64::from_bits(prev));

    let mut window: Option<Window> = None;
    loop {
        if !bits.read_bit()? {
            out.push(f64::from_bits(prev));
            continue;
        }

        let (leading, trailing) = if !bits.read_bit()? {
            match window {
                Some(w) => (w.leading, w.trailing),
                None => {
                    return Err(StorageError::Corruption(
                        "XOR stream reuses a window before defining one".into(),
                    ))
                }
            }
        } else {
            let leading = bits.read_bits(5)? as u32;
            let significant = match bits.read_bits(6)? as u32 {
                0 => 64,
                n => n,
            };
            if leading + significant > 64 {
                return Err(StorageError::Corruption(format!(
                    "XOR window of {} leading and {} significant bits exceeds 64",
                    leading, significant
                )));
            }
            let trailing = 64 - leading - significant;
            window = Some(Window { leading, trailing });
            (leading, trailing)
        };

        let significant = 64 - leading - trailing;
        let xor = bits.read_bits(significant)? << trailing;
        prev ^= xor;
        if prev == END_MARKER {
            return Ok(());
        }
        out.push(f64::from_bits(prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(values: &[f64]) -> Vec<f64> {
        let mut buf = Vec::new();
        encode(values, &mut buf).unwrap();
        let mut out = Vec::new();
        decode(&buf, &mut out).unwrap();
        out
    }

    #[test]
    fn test_repeated_values_are_tiny() {
        let values = vec![12.5f64; 1000];
        let mut buf = Vec::new();
        encode(&values, &mut buf).unwrap();
        // 64 bits + 999 zero bits + end marker
        assert!(buf.len() < 8 + 125 + 12);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn test_special_values() {
        let values = [
            0.0,
            -0.0,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::MIN_POSITIVE,
            f64::MAX,
            -1.0,
            1e-300,
        ];
        let out = roundtrip(&values);
        assert_eq!(out.len(), values.len());
        for (a, b) in values.iter().zip(&out) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_nan_rejected() {
        let mut buf = Vec::new();
        let err = encode(&[1.0, f64::NAN], &mut buf).unwrap_err();
        assert!(matches!(err, StorageError::Encoding(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_and_single() {
        assert!(roundtrip(&[]).is_empty());
        assert_eq!(roundtrip(&[3.25]), vec![3.25]);
    }

    #[test]
    fn test_truncated_stream() {
        let values: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let mut buf = Vec::new();
        encode(&values, &mut buf).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            decode(&buf[..buf.len() / 2], &mut out),
            Err(StorageError::TruncatedInput { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_xor_roundtrip(bits in proptest::collection::vec(any::<u64>(), 0..300)) {
            let values: Vec<f64> = bits
                .into_iter()
                .map(f64::from_bits)
                .filter(|v| !v.is_nan())
                .collect();
            let out = roundtrip(&values);
            prop_assert_eq!(out.len(), values.len());
            for (a, b) in values.iter().zip(&out) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }

    proptest! {
        #[test]
        fn prop_decode_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let mut out = Vec::new();
            if decode(&bytes, &mut out).is_ok() {
                prop_assert!(out.len() <= bytes.len() * 8);
            }
        }
    }
}
