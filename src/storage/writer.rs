//! Segment writer
//!
//! One directory per segment:
//! ```text
//! <dir>/info            SegmentInfo   schema, counts, time bounds, crc32
//! <dir>/<field>.pag     RowStoreV1    encoded pages (+ dictionary)
//! <dir>/<field>.ipag    RowStoreIdxV1 row id → page offset
//! <dir>/<field>.pos     PostingListV1 roaring bitmaps   (indexed fields)
//! <dir>/<field>.ipos    StringIndexV1 / SkipListV1      (indexed fields)
//! ```
//!
//! Page layout inside `.pag`:
//! ```text
//! [u8 encoding][uvarint offset][uvarint total_values]
//! [uvarint start_row_id][uvarint payload_size][framed block]
//! ```
//! `offset` repeats the page's own position in the file.
//!
//! `info` layout:
//! ```text
//! [header][bytes index_name][bytes segment_id][uvarint field_count]
//! ([uvarint id][bytes name][u8 type][u8 indexed][u8 encoding])*
//! [uvarint event_count][varint min_time][varint max_time]
//! [fixed32 crc32 of everything between header and checksum]
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::Config;
use crate::encoding::compressed::compression_stats;
use crate::encoding::{self, ByteCompression, DictionaryEncoder, EncodingKind};
use crate::index::block_index::BlockIndexWriter;
use crate::index::btrie::BurstTrie;
use crate::index::skiplist::{Comparator, FloatComparator, IntComparator, SkipList, ValueIndex};
use crate::io::header::FileType;
use crate::io::writer::BinaryWriter;
use crate::storage::column::{tokenize, Column, ColumnValues};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{FieldInfo, FieldType, IndexInfo};

/// Name of the segment metadata file
pub const INFO_FILE: &str = "info";

/// Codec and index tunables for one segment write
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub values_per_page: usize,
    pub rle_distinct_threshold: usize,
    pub dictionary_budget: usize,
    pub byte_compression: ByteCompression,
    pub max_bucket_size: usize,
    pub skiplist_max_level: usize,
    pub skiplist_probability: f64,
    /// Fixed skip list seed (reproducible files); entropy when unset
    pub skiplist_seed: Option<u64>,
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for WriteOptions {
    fn from(config: &Config) -> Self {
        Self {
            values_per_page: config.storage.values_per_page.clamp(1, encoding::MAX_PAGE_VALUES),
            rle_distinct_threshold: config.storage.rle_distinct_threshold,
            dictionary_budget: config.storage.dictionary_budget,
            byte_compression: config.storage.byte_compression,
            max_bucket_size: config.index.max_bucket_size,
            skiplist_max_level: config.index.skiplist_max_level,
            skiplist_probability: config.index.skiplist_probability,
            skiplist_seed: None,
            sync: config.storage.sync,
        }
    }
}

impl WriteOptions {
    fn skip_list<C: Comparator, V>(&self) -> SkipList<C, V> {
        match self.skiplist_seed {
            Some(seed) => {
                SkipList::with_seed(self.skiplist_max_level, self.skiplist_probability, seed)
            }
            None => SkipList::new(self.skiplist_max_level, self.skiplist_probability),
        }
    }
}

/// Everything `info` records besides the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    pub id: Uuid,
    pub event_count: u32,
    pub min_time: i64,
    pub max_time: i64,
}

pub fn column_path(dir: &Path, field: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", field, extension))
}

fn finish_file(writer: BinaryWriter<File>, sync: bool) -> StorageResult<u64> {
    if sync {
        writer.sync()
    } else {
        let len = writer.offset();
        writer.into_inner()?;
        Ok(len)
    }
}

/// Pick the page encoding for a whole column
pub fn select_encoding(
    field_type: FieldType,
    values: &ColumnValues,
    options: &WriteOptions,
) -> EncodingKind {
    match (field_type, values) {
        (FieldType::Timestamp, _) => EncodingKind::DoubleDelta,
        (FieldType::Int, ColumnValues::Int(v)) => {
            encoding::select_int_encoding(v, options.rle_distinct_threshold)
        }
        (FieldType::Float, ColumnValues::Float(v)) => {
            let kind = encoding::select_float_encoding(v);
            if kind != EncodingKind::Xor {
                tracing::warn!("Float column holds NaN, falling back to {}", kind);
            }
            kind
        }
        (FieldType::Keyword, ColumnValues::Bytes(v)) => {
            let kind = encoding::select_keyword_encoding(
                v,
                options.dictionary_budget,
                options.byte_compression,
            );
            if kind != EncodingKind::Dictionary {
                tracing::warn!(
                    budget = options.dictionary_budget,
                    "Keyword column exceeds dictionary budget, falling back to {}",
                    kind
                );
            }
            kind
        }
        (FieldType::Text, _) => options.byte_compression.into(),
        _ => EncodingKind::Plain,
    }
}

/// Write one column's `.pag`/`.ipag` (and `.pos`/`.ipos` when indexed).
/// Returns the encoding used.
pub fn write_column(dir: &Path, column: &Column, options: &WriteOptions) -> StorageResult<EncodingKind> {
    let field = column.field();
    let values = column.values();
    let kind = select_encoding(field.field_type, values, options);

    let mut pag = BinaryWriter::create(column_path(dir, &field.name, "pag"), FileType::RowStoreV1)?;
    let mut page_index = BlockIndexWriter::new();
    let mut dictionary = (kind == EncodingKind::Dictionary)
        .then(|| DictionaryEncoder::new(options.dictionary_budget));

    let per_page = options.values_per_page.clamp(1, encoding::MAX_PAGE_VALUES);
    let mut block = Vec::new();
    let mut pages = 0usize;
    let mut start = 0usize;
    while start < values.len() {
        let end = (start + per_page).min(values.len());
        block.clear();
        match values {
            ColumnValues::Int(v) | ColumnValues::Timestamp(v) => {
                encoding::encode_ints(kind, &v[start..end], &mut block)?
            }
            ColumnValues::Float(v) => encoding::encode_floats(kind, &v[start..end], &mut block)?,
            ColumnValues::Bytes(v) => {
                encoding::encode_bytes(kind, &v[start..end], dictionary.as_mut(), &mut block)?
            }
        }

        let offset = pag.offset();
        pag.write_u8(kind as u8)?;
        pag.write_uvarint(offset)?;
        pag.write_uvarint((end - start) as u64)?;
        pag.write_uvarint(start as u64)?;
        pag.write_uvarint(block.len() as u64)?;
        pag.write_raw(&block)?;
        page_index.add(start as u32, offset as i64)?;

        pages += 1;
        start = end;
    }

    if let Some(dictionary) = &dictionary {
        let dictionary_offset = pag.offset();
        let mut bytes = Vec::new();
        dictionary.dictionary_bytes(&mut bytes);
        pag.write_bytes(&bytes)?;
        pag.write_fixed64(dictionary_offset)?;
    }
    let pag_len = finish_file(pag, options.sync)?;

    let mut ipag =
        BinaryWriter::create(column_path(dir, &field.name, "ipag"), FileType::RowStoreIdxV1)?;
    page_index.finish(&mut ipag)?;
    finish_file(ipag, options.sync)?;

    if field.indexed {
        write_value_index(dir, field, values, options)?;
    }

    let stats = compression_stats(values.len(), raw_size(values), pag_len as usize);
    tracing::debug!(
        field = %field.name,
        encoding = %kind,
        pages,
        bytes = pag_len,
        ratio = stats.ratio,
        "Column written"
    );
    Ok(kind)
}

fn raw_size(values: &ColumnValues) -> usize {
    match values {
        ColumnValues::Int(v) | ColumnValues::Timestamp(v) => v.len() * 8,
        ColumnValues::Float(v) => v.len() * 8,
        ColumnValues::Bytes(v) => v.iter().map(Vec::len).sum(),
    }
}

fn write_value_index(
    dir: &Path,
    field: &FieldInfo,
    values: &ColumnValues,
    options: &WriteOptions,
) -> StorageResult<()> {
    let mut pos =
        BinaryWriter::create(column_path(dir, &field.name, "pos"), FileType::PostingListV1)?;
    let ipos_path = column_path(dir, &field.name, "ipos");

    match values {
        ColumnValues::Bytes(v) => {
            let mut trie = BurstTrie::new(options.max_bucket_size);
            for (row, value) in v.iter().enumerate() {
                let row = row as u32;
                if field.field_type == FieldType::Text {
                    let text = String::from_utf8_lossy(value);
                    for token in tokenize(&text) {
                        trie.insert(token.as_bytes(), row)?;
                    }
                } else {
                    trie.insert(value, row)?;
                }
            }
            let offsets = trie.postings().flush(&mut pos)?;
            let mut ipos = BinaryWriter::create(&ipos_path, FileType::StringIndexV1)?;
            trie.write_index(&offsets, &mut ipos)?;
            finish_file(ipos, options.sync)?;
        }
        ColumnValues::Int(v) | ColumnValues::Timestamp(v) => {
            let mut index: ValueIndex<IntComparator> = ValueIndex::new(options.skip_list());
            for (row, &value) in v.iter().enumerate() {
                index.insert(value, row as u32)?;
            }
            let offsets = index.postings().flush(&mut pos)?;
            let mut ipos = BinaryWriter::create(&ipos_path, FileType::SkipListV1)?;
            index.write_index(&offsets, &mut ipos)?;
            finish_file(ipos, options.sync)?;
        }
        ColumnValues::Float(v) => {
            let mut index: ValueIndex<FloatComparator> = ValueIndex::new(options.skip_list());
            for (row, &value) in v.iter().enumerate() {
                index.insert(value, row as u32)?;
            }
            let offsets = index.postings().flush(&mut pos)?;
            let mut ipos = BinaryWriter::create(&ipos_path, FileType::SkipListV1)?;
            index.write_index(&offsets, &mut ipos)?;
            finish_file(ipos, options.sync)?;
        }
    }

    finish_file(pos, options.sync)?;
    Ok(())
}

/// Write the `info` file
pub fn write_info(
    dir: &Path,
    info: &IndexInfo,
    encodings: &[EncodingKind],
    meta: &SegmentMeta,
    sync: bool,
) -> StorageResult<()> {
    if encodings.len() != info.fields().len() {
        return Err(StorageError::InvalidState(format!(
            "{} encodings for {} fields",
            encodings.len(),
            info.fields().len()
        )));
    }

    let mut body = BinaryWriter::new(Vec::new());
    body.write_bytes(info.name.as_bytes())?;
    body.write_bytes(meta.id.as_bytes())?;
    body.write_uvarint(info.fields().len() as u64)?;
    for (field, encoding) in info.fields().iter().zip(encodings) {
        body.write_uvarint(field.id as u64)?;
        body.write_bytes(field.name.as_bytes())?;
        body.write_u8(field.field_type as u8)?;
        body.write_u8(field.indexed as u8)?;
        body.write_u8(*encoding as u8)?;
    }
    body.write_uvarint(meta.event_count as u64)?;
    body.write_varint(meta.min_time)?;
    body.write_varint(meta.max_time)?;
    let body = body.into_inner()?;

    let mut file = BinaryWriter::create(dir.join(INFO_FILE), FileType::SegmentInfo)?;
    file.write_raw(&body)?;
    file.write_fixed32(crc32fast::hash(&body))?;
    finish_file(file, sync)?;
    Ok(())
}
