//! Delta encoding of integer sequences
//!
//! `dst[0] = src[0]; dst[i] = src[i] - src[i - 1]` and its inverse
//! cumulative sum. Byte-slice codecs use it on their end-offset arrays; the
//! arithmetic wraps so every `u64` sequence round-trips.

/// Delta-encode `src` into `dst` (cleared first)
pub fn delta_encode(src: &[u64], dst: &mut Vec<u64>) {
    dst.clear();
    dst.reserve(src.len());
    let mut prev = 0u64;
    for &value in src {
        dst.push(value.wrapping_sub(prev));
        prev = value;
    }
}

/// Inverse of [`delta_encode`]: running sum in place
pub fn delta_decode(values: &mut [u64]) {
    let mut acc = 0u64;
    for value in values.iter_mut() {
        acc = acc.wrapping_add(*value);
        *value = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_offsets() {
        let offsets = [3u64, 3, 10, 25];
        let mut deltas = Vec::new();
        delta_encode(&offsets, &mut deltas);
        assert_eq!(deltas, vec![3, 0, 7, 15]);

        delta_decode(&mut deltas);
        assert_eq!(deltas, offsets);
    }

    #[test]
    fn test_decreasing_values_wrap() {
        let values = [10u64, 2, u64::MAX, 0];
        let mut deltas = Vec::new();
        delta_encode(&values, &mut deltas);
        delta_decode(&mut deltas);
        assert_eq!(deltas, values);
    }

    proptest! {
        #[test]
        fn prop_delta_roundtrip(values in proptest::collection::vec(any::<u64>(), 1..512)) {
            let mut encoded = Vec::new();
            delta_encode(&values, &mut encoded);
            prop_assert_eq!(encoded.len(), values.len());
            delta_decode(&mut encoded);
            prop_assert_eq!(encoded, values);
        }
    }
}
