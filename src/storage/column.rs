//! In-memory columns
//!
//! A [`Column`] is a typed append-only vector for one field. The timestamp
//! column remembers whether it is still in non-decreasing order; when it is
//! not, the writer asks it for a sort map and applies that permutation to
//! every column so rows stay aligned.

use std::collections::HashSet;

use roaring::RoaringBitmap;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{FieldInfo, FieldType, Value};

/// Typed values of one column (or a decoded slice of one)
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    /// Text and keyword values as UTF-8 bytes
    Bytes(Vec<Vec<u8>>),
    Timestamp(Vec<i64>),
}

impl ColumnValues {
    pub fn for_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Int => ColumnValues::Int(Vec::new()),
            FieldType::Float => ColumnValues::Float(Vec::new()),
            FieldType::Text | FieldType::Keyword => ColumnValues::Bytes(Vec::new()),
            FieldType::Timestamp => ColumnValues::Timestamp(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int(v) | ColumnValues::Timestamp(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ColumnValues::Int(v) => v.get(index).map(|x| Value::Int(*x)),
            ColumnValues::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            ColumnValues::Bytes(v) => v
                .get(index)
                .map(|x| Value::Str(String::from_utf8_lossy(x).into_owned())),
            ColumnValues::Timestamp(v) => v.get(index).map(|x| Value::Timestamp(*x)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    fn push(&mut self, value: Value) -> StorageResult<()> {
        match (self, value) {
            (ColumnValues::Int(v), Value::Int(x)) => v.push(x),
            (ColumnValues::Float(v), Value::Float(x)) => v.push(x),
            (ColumnValues::Bytes(v), Value::Str(x)) => v.push(x.into_bytes()),
            (ColumnValues::Timestamp(v), Value::Timestamp(x)) => v.push(x),
            (_, value) => {
                return Err(StorageError::Encoding(format!(
                    "Cannot append {} value to column",
                    value.type_name()
                )))
            }
        }
        Ok(())
    }

    /// Append all of `other` (same variant)
    pub fn append(&mut self, other: ColumnValues) -> StorageResult<()> {
        match (self, other) {
            (ColumnValues::Int(a), ColumnValues::Int(b))
            | (ColumnValues::Timestamp(a), ColumnValues::Timestamp(b)) => a.extend(b),
            (ColumnValues::Float(a), ColumnValues::Float(b)) => a.extend(b),
            (ColumnValues::Bytes(a), ColumnValues::Bytes(b)) => a.extend(b),
            _ => {
                return Err(StorageError::Corruption(
                    "Column pages decode to different value types".into(),
                ))
            }
        }
        Ok(())
    }

    /// Keep only `[start, end)`
    pub fn retain_range(&mut self, start: usize, end: usize) {
        fn cut<T>(v: &mut Vec<T>, start: usize, end: usize) {
            let end = end.min(v.len());
            let start = start.min(end);
            v.truncate(end);
            v.drain(..start);
        }
        match self {
            ColumnValues::Int(v) | ColumnValues::Timestamp(v) => cut(v, start, end),
            ColumnValues::Float(v) => cut(v, start, end),
            ColumnValues::Bytes(v) => cut(v, start, end),
        }
    }

    /// Mark `base + i` for every value `i` equal to `query`.
    /// Text values match when they contain every token of the query.
    pub fn matching_rows(
        &self,
        field_type: FieldType,
        query: &Value,
        base: u32,
        out: &mut RoaringBitmap,
    ) {
        match (self, query) {
            (ColumnValues::Int(v), Value::Int(q))
            | (ColumnValues::Timestamp(v), Value::Timestamp(q)) => mark(v, base, out, |x| x == q),
            (ColumnValues::Float(v), Value::Float(q)) => {
                mark(v, base, out, |x| x.total_cmp(q).is_eq())
            }
            (ColumnValues::Bytes(v), Value::Str(q)) if field_type == FieldType::Text => {
                let terms: Vec<String> = tokenize(q).collect();
                if terms.is_empty() {
                    return;
                }
                mark(v, base, out, |x| {
                    let text = String::from_utf8_lossy(x);
                    let tokens: HashSet<String> = tokenize(&text).collect();
                    terms.iter().all(|t| tokens.contains(t))
                })
            }
            (ColumnValues::Bytes(v), Value::Str(q)) => {
                mark(v, base, out, |x| x.as_slice() == q.as_bytes())
            }
            _ => {}
        }
    }

    /// Mark `base + i` for every value `i` within `[lo, hi]`
    pub fn rows_in_range(&self, lo: &Value, hi: &Value, base: u32, out: &mut RoaringBitmap) {
        match (self, lo, hi) {
            (ColumnValues::Int(v), Value::Int(lo), Value::Int(hi))
            | (ColumnValues::Timestamp(v), Value::Timestamp(lo), Value::Timestamp(hi)) => {
                mark(v, base, out, |x| lo <= x && x <= hi)
            }
            (ColumnValues::Float(v), Value::Float(lo), Value::Float(hi)) => mark(v, base, out, |x| {
                x.total_cmp(lo).is_ge() && x.total_cmp(hi).is_le()
            }),
            _ => {}
        }
    }

    /// Reorder so that new position `i` holds old position `order[i]`
    fn permute(&mut self, order: &[u32]) {
        fn apply<T: Clone>(v: &mut Vec<T>, order: &[u32]) {
            let permuted: Vec<T> = order.iter().map(|&i| v[i as usize].clone()).collect();
            *v = permuted;
        }
        match self {
            ColumnValues::Int(v) | ColumnValues::Timestamp(v) => apply(v, order),
            ColumnValues::Float(v) => apply(v, order),
            ColumnValues::Bytes(v) => apply(v, order),
        }
    }
}

fn mark<T>(values: &[T], base: u32, out: &mut RoaringBitmap, matches: impl Fn(&T) -> bool) {
    for (i, value) in values.iter().enumerate() {
        if matches(value) {
            out.insert(base + i as u32);
        }
    }
}

/// Type check of a value against a declared field
pub fn check_value(field: &FieldInfo, value: &Value) -> StorageResult<()> {
    if value.fits(field.field_type) {
        Ok(())
    } else {
        Err(StorageError::TypeMismatch {
            field: field.name.clone(),
            expected: field.field_type.to_string(),
            found: value.type_name().to_string(),
        })
    }
}

/// Range queries need a numeric field and bounds of its type
pub fn check_range(field: &FieldInfo, lo: &Value, hi: &Value) -> StorageResult<()> {
    if field.field_type.is_string() {
        return Err(StorageError::Encoding(format!(
            "Range query on {} field {}",
            field.field_type, field.name
        )));
    }
    check_value(field, lo)?;
    check_value(field, hi)
}

#[derive(Debug, Clone)]
pub struct Column {
    field: FieldInfo,
    values: ColumnValues,
    monotonic: bool,
}

impl Column {
    pub fn new(field: FieldInfo) -> Self {
        let values = ColumnValues::for_type(field.field_type);
        Self {
            field,
            values,
            monotonic: true,
        }
    }

    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether timestamps arrived in non-decreasing order
    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    /// Type check without appending
    pub fn check(&self, value: &Value) -> StorageResult<()> {
        check_value(&self.field, value)
    }

    pub fn push(&mut self, value: Value) -> StorageResult<()> {
        self.check(&value)?;
        if let (ColumnValues::Timestamp(existing), Value::Timestamp(ts)) = (&self.values, &value) {
            if existing.last().is_some_and(|last| ts < last) {
                self.monotonic = false;
            }
        }
        self.values.push(value)
    }

    /// Permutation that sorts the timestamp column, if it needs one.
    /// The sort is stable so equal timestamps keep arrival order.
    pub fn sort_map(&self) -> Option<Vec<u32>> {
        match &self.values {
            ColumnValues::Timestamp(ts) if !self.monotonic => {
                let mut order: Vec<u32> = (0..ts.len() as u32).collect();
                order.sort_by_key(|&i| ts[i as usize]);
                Some(order)
            }
            _ => None,
        }
    }

    pub fn apply_sort_map(&mut self, order: &[u32]) -> StorageResult<()> {
        if order.len() != self.len() {
            return Err(StorageError::InvalidState(format!(
                "Sort map of {} rows applied to column {} with {} rows",
                order.len(),
                self.field.name,
                self.len()
            )));
        }
        self.values.permute(order);
        self.monotonic = true;
        Ok(())
    }
}

/// Index terms of a text value: lower-cased alphanumeric runs
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_column() -> Column {
        Column::new(FieldInfo {
            id: 0,
            name: "_time".into(),
            field_type: FieldType::Timestamp,
            indexed: false,
        })
    }

    #[test]
    fn test_monotonic_tracking() {
        let mut col = time_column();
        for ts in [10, 10, 20] {
            col.push(Value::Timestamp(ts)).unwrap();
        }
        assert!(col.is_monotonic());
        assert!(col.sort_map().is_none());

        col.push(Value::Timestamp(5)).unwrap();
        assert!(!col.is_monotonic());
        assert_eq!(col.sort_map().unwrap(), vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_sort_map_applies_to_all_columns() {
        let mut time = time_column();
        let mut host = Column::new(FieldInfo {
            id: 1,
            name: "host".into(),
            field_type: FieldType::Keyword,
            indexed: true,
        });
        for (ts, h) in [(30, "c"), (10, "a"), (20, "b")] {
            time.push(Value::Timestamp(ts)).unwrap();
            host.push(Value::from(h)).unwrap();
        }

        let order = time.sort_map().unwrap();
        time.apply_sort_map(&order).unwrap();
        host.apply_sort_map(&order).unwrap();

        assert_eq!(time.values(), &ColumnValues::Timestamp(vec![10, 20, 30]));
        assert_eq!(
            host.values(),
            &ColumnValues::Bytes(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        );
        assert!(time.is_monotonic());
        assert!(host.apply_sort_map(&[0]).is_err());
    }

    #[test]
    fn test_type_checked() {
        let mut col = time_column();
        let err = col.push(Value::Int(1)).unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
        assert!(col.is_empty());
    }

    #[test]
    fn test_values_range() {
        let mut values = ColumnValues::Int((0..10).collect());
        values.retain_range(3, 6);
        assert_eq!(values, ColumnValues::Int(vec![3, 4, 5]));
        values.append(ColumnValues::Int(vec![9])).unwrap();
        assert_eq!(values.get(3), Some(Value::Int(9)));
        assert!(values.append(ColumnValues::Float(vec![1.0])).is_err());
    }

    #[test]
    fn test_matching_rows() {
        let text = ColumnValues::Bytes(vec![
            b"disk full on /var".to_vec(),
            b"Disk quota ok".to_vec(),
            b"network down".to_vec(),
        ]);
        let mut rows = RoaringBitmap::new();
        text.matching_rows(FieldType::Text, &Value::from("DISK"), 10, &mut rows);
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![10, 11]);

        rows.clear();
        text.matching_rows(FieldType::Text, &Value::from("disk full"), 0, &mut rows);
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![0]);

        rows.clear();
        text.matching_rows(FieldType::Keyword, &Value::from("network down"), 0, &mut rows);
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![2]);

        let ints = ColumnValues::Int(vec![5, 1, 5, 9]);
        rows.clear();
        ints.rows_in_range(&Value::Int(2), &Value::Int(9), 0, &mut rows);
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("GET /api/v1/Users?id=42 -- OK").collect();
        assert_eq!(tokens, vec!["get", "api", "v1", "users", "id", "42", "ok"]);
        assert_eq!(tokenize("  ..  ").count(), 0);
    }
}
