//! Dictionary byte-slice codec
//!
//! Values are mapped to ids in insertion order. Each page stores only the
//! uvarint id stream; the dictionary itself is written once at the end of
//! the `.pag` file:
//!
//! ```text
//! ... pages ...
//! [uvarint len][plain byte-slice block of dictionary values]
//! [fixed64 offset of the dictionary block]
//! ```

use std::collections::HashMap;

use crate::encoding::plain;
use crate::io::reader::SliceReader;
use crate::io::varint::put_uvarint;
use crate::storage::error::{StorageError, StorageResult};

/// Default cap on distinct values per column
pub const DEFAULT_DICTIONARY_BUDGET: usize = 65_536;

#[derive(Debug)]
pub struct DictionaryEncoder {
    budget: usize,
    ids: HashMap<Vec<u8>, u32>,
    values: Vec<Vec<u8>>,
}

impl DictionaryEncoder {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            ids: HashMap::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Id of `value`, assigning the next one on first sight
    pub fn id_of(&mut self, value: &[u8]) -> StorageResult<u32> {
        if let Some(&id) = self.ids.get(value) {
            return Ok(id);
        }
        if self.values.len() >= self.budget {
            return Err(StorageError::Encoding(format!(
                "Dictionary budget of {} distinct values exceeded",
                self.budget
            )));
        }
        let id = self.values.len() as u32;
        self.ids.insert(value.to_vec(), id);
        self.values.push(value.to_vec());
        Ok(id)
    }

    /// Encode one page worth of values as an id stream
    pub fn encode<T: AsRef<[u8]>>(&mut self, values: &[T], out: &mut Vec<u8>) -> StorageResult<()> {
        for v in values {
            let id = self.id_of(v.as_ref())?;
            put_uvarint(out, id as u64);
        }
        Ok(())
    }

    /// Serialized dictionary (unframed plain byte-slice layout)
    pub fn dictionary_bytes(&self, out: &mut Vec<u8>) {
        plain::encode_bytes(&self.values, out);
    }
}

/// Decoded dictionary of a column
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    values: Vec<Vec<u8>>,
}

impl Dictionary {
    pub fn from_bytes(payload: &[u8]) -> StorageResult<Self> {
        let mut values = Vec::new();
        plain::decode_bytes(payload, &mut values)?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.values.get(id as usize).map(Vec::as_slice)
    }

    /// Resolve a page's id stream into values
    pub fn decode(&self, payload: &[u8], out: &mut Vec<Vec<u8>>) -> StorageResult<()> {
        let mut reader = SliceReader::new(payload);
        while reader.remaining() > 0 {
            let id = reader.read_uvarint()?;
            let value = u32::try_from(id)
                .ok()
                .and_then(|id| self.get(id))
                .ok_or_else(|| {
                    StorageError::Corruption(format!(
                        "Dictionary id {} out of range ({} entries)",
                        id,
                        self.values.len()
                    ))
                })?;
            out.push(value.to_vec());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ids_in_insertion_order() {
        let mut encoder = DictionaryEncoder::new(16);
        let mut page = Vec::new();
        encoder
            .encode(&["GET", "POST", "GET", "PUT", "GET"], &mut page)
            .unwrap();
        assert_eq!(page, vec![0, 1, 0, 2, 0]);
        assert_eq!(encoder.len(), 3);

        let mut dict_bytes = Vec::new();
        encoder.dictionary_bytes(&mut dict_bytes);
        let dictionary = Dictionary::from_bytes(&dict_bytes).unwrap();
        assert_eq!(dictionary.get(1), Some(&b"POST"[..]));
        assert_eq!(dictionary.get(3), None);

        let mut out = Vec::new();
        dictionary.decode(&page, &mut out).unwrap();
        assert_eq!(
            out,
            vec![
                b"GET".to_vec(),
                b"POST".to_vec(),
                b"GET".to_vec(),
                b"PUT".to_vec(),
                b"GET".to_vec()
            ]
        );
    }

    #[test]
    fn test_ids_span_pages() {
        let mut encoder = DictionaryEncoder::new(16);
        let mut first = Vec::new();
        let mut second = Vec::new();
        encoder.encode(&["a", "b"], &mut first).unwrap();
        encoder.encode(&["b", "c"], &mut second).unwrap();
        assert_eq!(second, vec![1, 2]);
    }

    #[test]
    fn test_budget_enforced() {
        let mut encoder = DictionaryEncoder::new(2);
        let mut page = Vec::new();
        let err = encoder.encode(&["x", "y", "x", "z"], &mut page).unwrap_err();
        assert!(matches!(err, StorageError::Encoding(_)));
        assert_eq!(encoder.len(), 2);
    }

    #[test]
    fn test_unknown_id_is_corruption() {
        let dictionary = Dictionary::from_bytes(&[0]).unwrap();
        assert!(dictionary.is_empty());
        let mut out = Vec::new();
        assert!(matches!(
            dictionary.decode(&[0], &mut out),
            Err(StorageError::Corruption(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_from_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            if let Ok(dictionary) = Dictionary::from_bytes(&bytes) {
                let mut out = Vec::new();
                let _ = dictionary.decode(&bytes, &mut out);
            }
        }
    }
}
