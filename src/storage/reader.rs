//! Segment reader
//!
//! [`read_segment`] maps the `info` file, checks its crc32, and opens one
//! [`ColumnReader`] per declared field. Columns locate pages through the
//! `.ipag` block index and answer value lookups through `.ipos`/`.pos`
//! when the field is indexed, falling back to a page scan otherwise.
//!
//! Dictionaries of keyword columns are loaded on first use.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use roaring::RoaringBitmap;
use serde::Serialize;
use uuid::Uuid;

use crate::encoding::{self, Dictionary, EncodingKind};
use crate::index::block_index::BlockIndexReader;
use crate::index::btrie::TrieReader;
use crate::index::posting::PostingReader;
use crate::index::skiplist::{FloatComparator, IntComparator, SkipListReader};
use crate::io::header::{FileType, HEADER_SIZE};
use crate::io::mmap::MappedFile;
use crate::io::reader::SliceReader;
use crate::storage::column::{check_range, check_value, ColumnValues};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::{query_terms, ColumnScan, SegmentSource};
use crate::storage::types::{FieldInfo, FieldType, IndexInfo, Value};
use crate::storage::writer::{column_path, INFO_FILE};

/// Fixed part of one `.pag` page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub encoding: EncodingKind,
    pub offset: u64,
    pub total_values: u32,
    pub start_row_id: u32,
    /// Size of the framed block that follows
    pub payload_size: u64,
}

/// One decoded page
#[derive(Debug, Clone)]
pub struct Page {
    pub header: PageHeader,
    pub values: ColumnValues,
}

enum Keys {
    Terms(TrieReader),
    Ints(SkipListReader<IntComparator>),
    Floats(SkipListReader<FloatComparator>),
}

struct ValueIndexFiles {
    keys: Keys,
    postings: PostingReader,
    /// Bytes of `.pos` + `.ipos`
    size: u64,
}

impl ValueIndexFiles {
    fn open(dir: &Path, field: &FieldInfo) -> StorageResult<Self> {
        let pos = MappedFile::open(column_path(dir, &field.name, "pos"))?;
        let ipos = MappedFile::open(column_path(dir, &field.name, "ipos"))?;
        let size = (pos.len() + ipos.len()) as u64;
        let keys = match field.field_type {
            FieldType::Text | FieldType::Keyword => Keys::Terms(TrieReader::new(ipos)?),
            FieldType::Int | FieldType::Timestamp => Keys::Ints(SkipListReader::new(ipos)?),
            FieldType::Float => Keys::Floats(SkipListReader::new(ipos)?),
        };
        Ok(Self {
            keys,
            postings: PostingReader::new(pos)?,
            size,
        })
    }

    fn cardinality(&self) -> u64 {
        match &self.keys {
            Keys::Terms(trie) => trie.cardinality(),
            Keys::Ints(list) => list.len(),
            Keys::Floats(list) => list.len(),
        }
    }

    fn rows_at(&self, offset: Option<u64>) -> StorageResult<Option<RoaringBitmap>> {
        offset.map(|o| self.postings.read(o)).transpose()
    }
}

/// Read side of one column
pub struct ColumnReader {
    field: FieldInfo,
    encoding: EncodingKind,
    event_count: u32,
    pages: MappedFile,
    /// End of the page region (start of the dictionary, if any)
    data_end: usize,
    page_index: BlockIndexReader,
    value_index: Option<ValueIndexFiles>,
    dictionary: OnceLock<Dictionary>,
}

impl fmt::Debug for ColumnReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnReader")
            .field("field", &self.field.name)
            .field("encoding", &self.encoding)
            .field("pages", &self.page_index.len())
            .field("indexed", &self.value_index.is_some())
            .finish()
    }
}

impl ColumnReader {
    fn open(
        dir: &Path,
        field: FieldInfo,
        encoding: EncodingKind,
        event_count: u32,
    ) -> StorageResult<Self> {
        let pages = MappedFile::open_typed(column_path(dir, &field.name, "pag"), FileType::RowStoreV1)?;
        let page_index = BlockIndexReader::new(MappedFile::open(column_path(dir, &field.name, "ipag"))?)?;

        let data_end = if encoding == EncodingKind::Dictionary {
            let offset = pages.trailing_fixed64(8)? as usize;
            if offset < HEADER_SIZE || offset > pages.len() - 8 {
                return Err(StorageError::Corruption(format!(
                    "Dictionary offset {} outside {} bytes of {}",
                    offset,
                    pages.len(),
                    pages.path().display()
                )));
            }
            offset
        } else {
            pages.len()
        };

        let value_index = if field.indexed {
            Some(ValueIndexFiles::open(dir, &field)?)
        } else {
            None
        };

        Ok(Self {
            field,
            encoding,
            event_count,
            pages,
            data_end,
            page_index,
            value_index,
            dictionary: OnceLock::new(),
        })
    }

    pub fn encoding(&self) -> EncodingKind {
        self.encoding
    }

    pub fn is_indexed(&self) -> bool {
        self.value_index.is_some()
    }

    pub fn page_count(&self) -> u64 {
        self.page_index.len()
    }

    fn dictionary(&self) -> StorageResult<&Dictionary> {
        if let Some(dictionary) = self.dictionary.get() {
            return Ok(dictionary);
        }
        let mut reader = SliceReader::at(self.pages.as_slice(), self.data_end)?;
        let dictionary = Dictionary::from_bytes(reader.read_bytes()?)?;
        tracing::debug!(
            field = %self.field.name,
            entries = dictionary.len(),
            "Dictionary loaded"
        );
        Ok(self.dictionary.get_or_init(|| dictionary))
    }

    /// Parse the page header at `offset`, returning it with its framed block
    pub fn page_header(&self, offset: u64) -> StorageResult<(PageHeader, &[u8])> {
        let data = &self.pages.as_slice()[..self.data_end];
        let mut reader = SliceReader::at(data, offset as usize)?;

        let encoding = EncodingKind::try_from(reader.read_u8()?)?;
        let stored = reader.read_uvarint()?;
        if stored != offset {
            return Err(StorageError::Corruption(format!(
                "Page at {} of {} claims offset {}",
                offset, self.field.name, stored
            )));
        }
        let total_values = to_u32(reader.read_uvarint()?, "page value count")?;
        let start_row_id = to_u32(reader.read_uvarint()?, "page start row")?;
        let payload_size = reader.read_uvarint()?;
        let block = reader.read_slice(payload_size as usize)?;

        let header = PageHeader {
            encoding,
            offset,
            total_values,
            start_row_id,
            payload_size,
        };
        Ok((header, block))
    }

    fn decode(&self, header: &PageHeader, block: &[u8]) -> StorageResult<ColumnValues> {
        let values = match self.field.field_type {
            FieldType::Int | FieldType::Timestamp => {
                let mut out = Vec::new();
                encoding::decode_ints(header.encoding, block, &mut out)?;
                if self.field.field_type == FieldType::Int {
                    ColumnValues::Int(out)
                } else {
                    ColumnValues::Timestamp(out)
                }
            }
            FieldType::Float => {
                let mut out = Vec::new();
                encoding::decode_floats(header.encoding, block, &mut out)?;
                ColumnValues::Float(out)
            }
            FieldType::Text | FieldType::Keyword => {
                let dictionary = if header.encoding == EncodingKind::Dictionary {
                    Some(self.dictionary()?)
                } else {
                    None
                };
                let mut out = Vec::new();
                encoding::decode_bytes(header.encoding, block, dictionary, &mut out)?;
                ColumnValues::Bytes(out)
            }
        };

        if values.len() != header.total_values as usize {
            return Err(StorageError::Corruption(format!(
                "Page at {} of {} holds {} values, header says {}",
                header.offset,
                self.field.name,
                values.len(),
                header.total_values
            )));
        }
        Ok(values)
    }

    fn read_page(&self, offset: i64, base_row_id: u32) -> StorageResult<Page> {
        let offset = u64::try_from(offset).map_err(|_| {
            StorageError::Corruption(format!("Negative page offset {} in {}", offset, self.field.name))
        })?;
        let (header, block) = self.page_header(offset)?;
        if header.start_row_id != base_row_id {
            return Err(StorageError::Corruption(format!(
                "Page at {} of {} starts at row {}, index says {}",
                offset, self.field.name, header.start_row_id, base_row_id
            )));
        }
        let values = self.decode(&header, block)?;
        Ok(Page { header, values })
    }

    /// Every page in row order
    pub fn pages(&self) -> impl Iterator<Item = StorageResult<Page>> + '_ {
        self.page_index.iter().map(move |entry| {
            let entry = entry?;
            self.read_page(entry.offset, entry.base_row_id)
        })
    }

    fn scan_matching(&self, value: &Value) -> StorageResult<Option<RoaringBitmap>> {
        let mut rows = RoaringBitmap::new();
        for page in self.pages() {
            let page = page?;
            page.values.matching_rows(
                self.field.field_type,
                value,
                page.header.start_row_id,
                &mut rows,
            );
        }
        Ok((!rows.is_empty()).then_some(rows))
    }

    fn indexed_lookup(
        &self,
        index: &ValueIndexFiles,
        value: &Value,
    ) -> StorageResult<Option<RoaringBitmap>> {
        match (&index.keys, value) {
            (Keys::Terms(trie), _) => {
                let mut rows: Option<RoaringBitmap> = None;
                for term in query_terms(&self.field, value)? {
                    let Some(found) = index.rows_at(trie.lookup(&term)?)? else {
                        return Ok(None);
                    };
                    rows = Some(match rows {
                        Some(acc) => acc & found,
                        None => found,
                    });
                }
                Ok(rows)
            }
            (Keys::Ints(list), Value::Int(key) | Value::Timestamp(key)) => {
                index.rows_at(list.search(key)?)
            }
            (Keys::Floats(list), Value::Float(key)) => index.rows_at(list.search(key)?),
            _ => Ok(None),
        }
    }

    fn indexed_range(
        &self,
        index: &ValueIndexFiles,
        lo: &Value,
        hi: &Value,
    ) -> StorageResult<RoaringBitmap> {
        let offsets: Vec<u64> = match (&index.keys, lo, hi) {
            (Keys::Ints(list), Value::Int(lo), Value::Int(hi))
            | (Keys::Ints(list), Value::Timestamp(lo), Value::Timestamp(hi)) => {
                list.range(lo, hi)?.into_iter().map(|(_, o)| o).collect()
            }
            (Keys::Floats(list), Value::Float(lo), Value::Float(hi)) => {
                list.range(lo, hi)?.into_iter().map(|(_, o)| o).collect()
            }
            _ => Vec::new(),
        };

        let mut rows = RoaringBitmap::new();
        for offset in offsets {
            rows |= index.postings.read(offset)?;
        }
        Ok(rows)
    }
}

fn to_u32(value: u64, what: &str) -> StorageResult<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Corruption(format!("{} {} exceeds 32 bits", what, value)))
}

impl ColumnScan for ColumnReader {
    fn field(&self) -> &FieldInfo {
        &self.field
    }

    fn row_count(&self) -> u32 {
        self.event_count
    }

    fn lookup(&self, value: &Value) -> StorageResult<Option<RoaringBitmap>> {
        check_value(&self.field, value)?;
        let rows = match &self.value_index {
            Some(index) => self.indexed_lookup(index, value)?,
            None => self.scan_matching(value)?,
        };
        Ok(rows.filter(|r| !r.is_empty()))
    }

    fn range(&self, lo: &Value, hi: &Value) -> StorageResult<RoaringBitmap> {
        check_range(&self.field, lo, hi)?;
        if let Some(index) = &self.value_index {
            return self.indexed_range(index, lo, hi);
        }
        let mut rows = RoaringBitmap::new();
        for page in self.pages() {
            let page = page?;
            page.values
                .rows_in_range(lo, hi, page.header.start_row_id, &mut rows);
        }
        Ok(rows)
    }

    fn scan(&self, rows: Range<u32>) -> StorageResult<ColumnValues> {
        let mut out = ColumnValues::for_type(self.field.field_type);
        let end = rows.end.min(self.event_count);
        if rows.start >= end {
            return Ok(out);
        }

        let first = self.page_index.lookup(rows.start)?.ok_or_else(|| {
            StorageError::Corruption(format!("No page holds row {} of {}", rows.start, self.field.name))
        })?;

        for index in first.index..self.page_index.len() {
            let entry = self.page_index.entry(index)?;
            if entry.base_row_id >= end {
                break;
            }
            let mut page = self.read_page(entry.offset, entry.base_row_id)?;
            let base = page.header.start_row_id;
            let lo = rows.start.saturating_sub(base) as usize;
            let hi = (end - base) as usize;
            page.values.retain_range(lo, hi);
            out.append(page.values)?;
        }
        Ok(out)
    }
}

/// Per-column summary for `stats`
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub id: u32,
    pub name: String,
    pub field_type: FieldType,
    pub indexed: bool,
    pub encoding: EncodingKind,
    pub pages: u64,
    pub page_index_levels: usize,
    /// Bytes of `.pag`
    pub data_bytes: u64,
    /// Bytes of `.ipag`, `.pos` and `.ipos`
    pub index_bytes: u64,
    /// Distinct indexed terms or values
    pub cardinality: Option<u64>,
}

/// Segment summary for `stats`
#[derive(Debug, Clone, Serialize)]
pub struct SegmentStats {
    pub id: String,
    pub index: String,
    pub path: PathBuf,
    pub event_count: u32,
    pub min_time: Option<i64>,
    pub max_time: Option<i64>,
    pub field_count: usize,
    pub columns: Vec<ColumnStats>,
}

/// An opened, immutable segment directory
#[derive(Debug)]
pub struct SegmentReader {
    dir: PathBuf,
    id: Uuid,
    info: IndexInfo,
    event_count: u32,
    min_time: i64,
    max_time: i64,
    columns: Vec<ColumnReader>,
}

impl SegmentReader {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn columns(&self) -> &[ColumnReader] {
        &self.columns
    }

    pub fn column_reader(&self, name: &str) -> Option<&ColumnReader> {
        self.columns.iter().find(|c| c.field.name == name)
    }

    pub fn stats(&self) -> SegmentStats {
        let range = self.time_range();
        SegmentStats {
            id: self.id.to_string(),
            index: self.info.name.clone(),
            path: self.dir.clone(),
            event_count: self.event_count,
            min_time: range.map(|(lo, _)| lo),
            max_time: range.map(|(_, hi)| hi),
            field_count: self.info.fields().len(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnStats {
                    id: c.field.id,
                    name: c.field.name.clone(),
                    field_type: c.field.field_type,
                    indexed: c.field.indexed,
                    encoding: c.encoding,
                    pages: c.page_index.len(),
                    page_index_levels: c.page_index.level_count(),
                    data_bytes: c.pages.len() as u64,
                    index_bytes: c.page_index.file_len() as u64
                        + c.value_index.as_ref().map_or(0, |i| i.size),
                    cardinality: c.value_index.as_ref().map(ValueIndexFiles::cardinality),
                })
                .collect(),
        }
    }
}

impl SegmentSource for SegmentReader {
    fn info(&self) -> &IndexInfo {
        &self.info
    }

    fn event_count(&self) -> u32 {
        self.event_count
    }

    fn time_range(&self) -> Option<(i64, i64)> {
        (self.event_count > 0).then_some((self.min_time, self.max_time))
    }

    fn column(&self, name: &str) -> Option<&dyn ColumnScan> {
        self.column_reader(name).map(|c| c as &dyn ColumnScan)
    }
}

struct InfoFile {
    id: Uuid,
    info: IndexInfo,
    encodings: Vec<EncodingKind>,
    event_count: u32,
    min_time: i64,
    max_time: i64,
}

fn utf8(bytes: &[u8], what: &str) -> StorageResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StorageError::Corruption(format!("{} is not UTF-8: {}", what, e)))
}

fn parse_info(file: &MappedFile) -> StorageResult<InfoFile> {
    let mut reader = file.reader();
    reader.read_header(FileType::SegmentInfo)?;
    if reader.remaining() < 4 {
        return Err(StorageError::truncated(4, reader.remaining()));
    }

    let len = reader.len();
    let body = reader.slice(HEADER_SIZE, len - 4)?;
    let stored = reader.read_fixed32_at(len - 4)?;
    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(StorageError::Corruption(format!(
            "Checksum mismatch in {}: stored {:08x}, computed {:08x}",
            file.path().display(),
            stored,
            actual
        )));
    }

    let mut body = SliceReader::new(body);
    let name = utf8(body.read_bytes()?, "Index name")?;
    let id = Uuid::from_slice(body.read_bytes()?)
        .map_err(|e| StorageError::Corruption(format!("Bad segment id: {}", e)))?;

    let field_count = body.read_uvarint()? as usize;
    let mut fields = Vec::with_capacity(field_count.min(1024));
    let mut encodings = Vec::with_capacity(field_count.min(1024));
    for position in 0..field_count {
        let id = to_u32(body.read_uvarint()?, "field id")?;
        if id as usize != position {
            return Err(StorageError::Corruption(format!(
                "Field at position {} has id {}",
                position, id
            )));
        }
        let name = utf8(body.read_bytes()?, "Field name")?;
        let field_type = FieldType::try_from(body.read_u8()?)?;
        let indexed = match body.read_u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(StorageError::Corruption(format!(
                    "Field {} has indexed flag {}",
                    name, other
                )))
            }
        };
        encodings.push(EncodingKind::try_from(body.read_u8()?)?);
        fields.push(FieldInfo {
            id,
            name,
            field_type,
            indexed,
        });
    }

    let event_count = to_u32(body.read_uvarint()?, "event count")?;
    let min_time = body.read_varint()?;
    let max_time = body.read_varint()?;
    if body.remaining() != 0 {
        return Err(StorageError::Corruption(format!(
            "{} trailing bytes in segment info",
            body.remaining()
        )));
    }

    Ok(InfoFile {
        id,
        info: IndexInfo::from_parts(name, fields)?,
        encodings,
        event_count,
        min_time,
        max_time,
    })
}

/// Open the segment written to `dir`
pub fn read_segment(dir: impl AsRef<Path>) -> StorageResult<SegmentReader> {
    let dir = dir.as_ref();
    let file = MappedFile::open(dir.join(INFO_FILE))?;
    let parsed = parse_info(&file)?;

    let mut columns = Vec::with_capacity(parsed.encodings.len());
    for (field, encoding) in parsed.info.fields().iter().zip(&parsed.encodings) {
        let column = ColumnReader::open(dir, field.clone(), *encoding, parsed.event_count)?;
        if column.pages.len() > HEADER_SIZE && column.page_index.is_empty() {
            tracing::warn!(field = %field.name, "Column has data but an empty page index");
        }
        columns.push(column);
    }

    tracing::info!(
        segment = %parsed.id,
        index = %parsed.info.name,
        events = parsed.event_count,
        path = ?dir,
        "Segment opened"
    );

    Ok(SegmentReader {
        dir: dir.to_path_buf(),
        id: parsed.id,
        info: parsed.info,
        event_count: parsed.event_count,
        min_time: parsed.min_time,
        max_time: parsed.max_time,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::Segment;
    use crate::storage::types::Event;
    use crate::storage::writer::WriteOptions;
    use tempfile::tempdir;

    const HOSTS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

    fn schema() -> IndexInfo {
        IndexInfo::new("logs")
            .with_field("host", FieldType::Keyword, true)
            .unwrap()
            .with_field("status", FieldType::Int, true)
            .unwrap()
            .with_field("latency", FieldType::Float, false)
            .unwrap()
            .with_field("message", FieldType::Text, true)
            .unwrap()
    }

    fn options() -> WriteOptions {
        WriteOptions {
            values_per_page: 100,
            skiplist_seed: Some(7),
            sync: false,
            ..WriteOptions::default()
        }
    }

    fn event(i: i64) -> Event {
        Event::new(1_600_000_000_000 + i * 250)
            .with("host", HOSTS[i as usize % 4])
            .with("status", 200 + (i % 3) * 100)
            .with("latency", i as f64 * 0.5)
            .with("message", format!("request {} served by {}", i, HOSTS[i as usize % 4]))
    }

    fn write(events: &[Event]) -> (tempfile::TempDir, SegmentReader) {
        let dir = tempdir().unwrap();
        let mut segment = Segment::with_options(schema(), options());
        segment.add_batch(events).unwrap();
        segment.write(dir.path()).unwrap();
        segment.close().unwrap();
        let reader = read_segment(dir.path()).unwrap();
        (dir, reader)
    }

    #[test]
    fn test_round_trip_small() {
        let events: Vec<Event> = (0..4).map(event).collect();
        let (_dir, reader) = write(&events);

        assert_eq!(reader.info(), &schema());
        assert_eq!(reader.event_count(), 4);
        assert_eq!(
            reader.time_range(),
            Some((1_600_000_000_000, 1_600_000_000_750))
        );
        assert_eq!(reader.events(0..4).unwrap(), events);
    }

    #[test]
    fn test_round_trip_many_pages() {
        let events: Vec<Event> = (0..1000).map(event).collect();
        let (_dir, reader) = write(&events);

        let host = reader.column_reader("host").unwrap();
        assert_eq!(host.encoding(), EncodingKind::Dictionary);
        assert_eq!(host.page_count(), 10);
        assert_eq!(
            reader.column_reader("_time").unwrap().encoding(),
            EncodingKind::DoubleDelta
        );
        assert_eq!(reader.column_reader("status").unwrap().encoding(), EncodingKind::Rle);
        assert_eq!(reader.column_reader("latency").unwrap().encoding(), EncodingKind::Xor);

        assert_eq!(reader.events(0..1000).unwrap(), events);
        // crosses a page boundary
        assert_eq!(reader.events(95..205).unwrap(), events[95..205].to_vec());
        assert!(reader.events(1000..1200).unwrap().is_empty());
    }

    #[test]
    fn test_sorted_by_time_on_write() {
        let mut events: Vec<Event> = (0..300).map(event).collect();
        events.reverse();
        let (_dir, reader) = write(&events);

        events.reverse();
        assert_eq!(reader.events(0..300).unwrap(), events);
    }

    #[test]
    fn test_lookups() {
        let events: Vec<Event> = (0..1000).map(event).collect();
        let (_dir, reader) = write(&events);

        let host = reader.column("host").unwrap();
        let rows = host.lookup(&Value::from("gamma")).unwrap().unwrap();
        assert_eq!(rows.len(), 250);
        assert!(rows.iter().all(|r| r % 4 == 2));
        assert!(host.lookup(&Value::from("omega")).unwrap().is_none());

        let status = reader.column("status").unwrap();
        let rows = status.lookup(&Value::Int(300)).unwrap().unwrap();
        assert!(rows.iter().all(|r| r % 3 == 1));
        let rows = status.range(&Value::Int(250), &Value::Int(400)).unwrap();
        assert_eq!(rows.len(), 666);

        let message = reader.column("message").unwrap();
        let rows = message.lookup(&Value::from("Served by BETA")).unwrap().unwrap();
        assert_eq!(rows.len(), 250);
        let rows = message.lookup(&Value::from("request 17")).unwrap().unwrap();
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![17]);

        // unindexed column scans pages
        let latency = reader.column("latency").unwrap();
        let rows = latency.lookup(&Value::Float(10.0)).unwrap().unwrap();
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![20]);
        let rows = latency.range(&Value::Float(0.0), &Value::Float(4.5)).unwrap();
        assert_eq!(rows.len(), 10);

        assert!(status.lookup(&Value::from("300")).is_err());
    }

    #[test]
    fn test_stats() {
        let events: Vec<Event> = (0..1000).map(event).collect();
        let (dir, reader) = write(&events);

        let stats = reader.stats();
        assert_eq!(stats.index, "logs");
        assert_eq!(stats.field_count, 5);
        assert_eq!(stats.path, dir.path());
        let host = &stats.columns[1];
        assert_eq!(host.name, "host");
        assert_eq!(host.cardinality, Some(4));
        assert_eq!(host.pages, 10);
        assert_eq!(stats.columns[3].cardinality, None);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["columns"][2]["encoding"], "rle");
        assert_eq!(json["columns"][2]["field_type"], "int");
    }

    #[test]
    fn test_corrupt_info_detected() {
        let events: Vec<Event> = (0..4).map(event).collect();
        let (dir, reader) = write(&events);
        drop(reader);

        let path = dir.path().join(INFO_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_segment(dir.path()),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_damaged_pages_return_errors() {
        let events: Vec<Event> = (0..12).map(event).collect();
        let (dir, reader) = write(&events);
        drop(reader);

        for name in ["host", "status", "latency", "message"] {
            let path = dir.path().join(format!("{}.pag", name));
            let original = std::fs::read(&path).unwrap();
            for i in HEADER_SIZE..original.len() {
                let mut bytes = original.clone();
                bytes[i] ^= 0x5a;
                std::fs::write(&path, &bytes).unwrap();

                // any outcome but a panic
                if let Ok(reader) = read_segment(dir.path()) {
                    let column = reader.column(name).unwrap();
                    let _ = column.scan(0..12);
                    let _ = column.lookup(&events[3].values[name]);
                }
            }
            std::fs::write(&path, &original).unwrap();
        }
    }

    #[test]
    fn test_missing_column_file() {
        let events: Vec<Event> = (0..4).map(event).collect();
        let (dir, reader) = write(&events);
        drop(reader);

        std::fs::remove_file(dir.path().join("status.ipag")).unwrap();
        assert!(matches!(read_segment(dir.path()), Err(StorageError::Io(_))));
    }
}
