//! Multi-level block/page index
//!
//! Maps a row id to the page holding it. Entries are `(base_row_id, offset)`
//! pairs with strictly increasing base row ids.
//!
//! Every index page is 8 KiB:
//! ```text
//! leaf  page: [u32 row_id; 682][i64 offset; 682][zero padding]
//! upper page: [u32 row_id; 2048]
//! ```
//! Entry `j` of upper page `p` describes page `p * 2048 + j` of the level
//! below (its row id is that page's first row id). Unused slots are zero;
//! a zero row id after slot 0 ends the valid entries of a page.
//!
//! `.ipag` layout (`RowStoreIdxV1`):
//! ```text
//! [header][leaf level][level 1]...[root level]
//! [fixed64 level_offset]*L   (root first)
//! [fixed64 entry_count]
//! [fixed32 L]
//! ```

use std::io::Write;

use crate::io::header::FileType;
use crate::io::mmap::MappedFile;
use crate::io::writer::BinaryWriter;
use crate::storage::error::{StorageError, StorageResult};

pub const PAGE_SIZE: usize = 8192;
/// Entries per leaf page (4-byte row id + 8-byte offset each)
pub const LEAF_FANOUT: usize = PAGE_SIZE / 12;
/// Entries per upper page (4-byte row id each)
pub const UPPER_FANOUT: usize = PAGE_SIZE / 4;

/// One located page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// Position among all entries
    pub index: u64,
    pub base_row_id: u32,
    pub offset: i64,
}

#[derive(Debug, Default)]
pub struct BlockIndexWriter {
    entries: Vec<(u32, i64)>,
}

impl BlockIndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, base_row_id: u32, offset: i64) -> StorageResult<()> {
        if let Some(&(last, _)) = self.entries.last() {
            if base_row_id <= last {
                return Err(StorageError::Encoding(format!(
                    "Block base row id {} does not follow {}",
                    base_row_id, last
                )));
            }
        }
        self.entries.push((base_row_id, offset));
        Ok(())
    }

    /// Write every level plus the footer
    pub fn finish<W: Write>(self, writer: &mut BinaryWriter<W>) -> StorageResult<()> {
        let mut level_offsets = Vec::new();

        if !self.entries.is_empty() {
            // leaf level
            let start = writer.offset();
            level_offsets.push(start);
            let mut firsts = Vec::with_capacity(self.entries.len().div_ceil(LEAF_FANOUT));
            for chunk in self.entries.chunks(LEAF_FANOUT) {
                firsts.push(chunk[0].0);
                for slot in 0..LEAF_FANOUT {
                    writer.write_fixed32(chunk.get(slot).map_or(0, |e| e.0))?;
                }
                for slot in 0..LEAF_FANOUT {
                    writer.write_fixed64(chunk.get(slot).map_or(0, |e| e.1) as u64)?;
                }
                writer.pad_to(start, PAGE_SIZE as u64)?;
            }

            // upper levels until one page remains
            let mut below = firsts;
            while below.len() > 1 {
                let start = writer.offset();
                level_offsets.push(start);
                let mut firsts = Vec::with_capacity(below.len().div_ceil(UPPER_FANOUT));
                for chunk in below.chunks(UPPER_FANOUT) {
                    firsts.push(chunk[0]);
                    for slot in 0..UPPER_FANOUT {
                        writer.write_fixed32(chunk.get(slot).copied().unwrap_or(0))?;
                    }
                }
                below = firsts;
            }
        }

        for &offset in level_offsets.iter().rev() {
            writer.write_fixed64(offset)?;
        }
        writer.write_fixed64(self.entries.len() as u64)?;
        writer.write_fixed32(level_offsets.len() as u32)?;

        tracing::debug!(
            entries = self.entries.len(),
            levels = level_offsets.len(),
            "Block index written"
        );
        Ok(())
    }
}

/// Row-id lookups over a mapped `.ipag` file
#[derive(Debug, Clone)]
pub struct BlockIndexReader {
    file: MappedFile,
    /// Root first
    levels: Vec<u64>,
    entry_count: u64,
}

impl BlockIndexReader {
    pub fn new(file: MappedFile) -> StorageResult<Self> {
        file.header(FileType::RowStoreIdxV1)?;
        let data = file.reader();
        let len = file.len();
        if len < 4 + 12 {
            return Err(StorageError::truncated(16, len));
        }

        let level_count = data.read_fixed32_at(len - 4)? as usize;
        let entry_count = data.read_fixed64_at(len - 12)?;
        let footer = 12 + level_count * 8;
        if footer > len - 4 {
            return Err(StorageError::Corruption(format!(
                "Block index declares {} levels in {} bytes",
                level_count, len
            )));
        }

        let mut levels = Vec::with_capacity(level_count);
        let mut cursor = data.read_at(len - footer)?;
        for _ in 0..level_count {
            levels.push(cursor.read_fixed64()?);
        }
        if (entry_count == 0) != levels.is_empty() {
            return Err(StorageError::Corruption(format!(
                "Block index holds {} entries over {} levels",
                entry_count, level_count
            )));
        }

        Ok(Self {
            file,
            levels,
            entry_count,
        })
    }

    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Size of the index file in bytes
    pub fn file_len(&self) -> usize {
        self.file.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn row_id_at(&self, page_start: usize, slot: usize) -> StorageResult<u32> {
        self.file.reader().read_fixed32_at(page_start + slot * 4)
    }

    /// Greatest slot whose row id is <= `row_id`
    fn find_floor(&self, page_start: usize, fanout: usize, row_id: u32) -> StorageResult<Option<usize>> {
        let mut floor = None;
        for slot in 0..fanout {
            let candidate = self.row_id_at(page_start, slot)?;
            if slot > 0 && candidate == 0 {
                break;
            }
            if candidate > row_id {
                break;
            }
            floor = Some(slot);
        }
        Ok(floor)
    }

    /// Page covering `row_id`, or `None` before the first entry
    pub fn lookup(&self, row_id: u32) -> StorageResult<Option<BlockRef>> {
        let leaf_level = match self.levels.len().checked_sub(1) {
            Some(l) => l,
            None => return Ok(None),
        };

        let mut page = 0usize;
        for (depth, &level_offset) in self.levels.iter().enumerate() {
            let page_start = level_offset as usize + page * PAGE_SIZE;
            let fanout = if depth == leaf_level {
                LEAF_FANOUT
            } else {
                UPPER_FANOUT
            };
            let Some(slot) = self.find_floor(page_start, fanout, row_id)? else {
                return Ok(None);
            };

            if depth == leaf_level {
                let index = (page * LEAF_FANOUT + slot) as u64;
                if index >= self.entry_count {
                    return Err(StorageError::Corruption(format!(
                        "Block index slot {} beyond {} entries",
                        index, self.entry_count
                    )));
                }
                return self.entry(index).map(Some);
            }
            page = page * UPPER_FANOUT + slot;
        }
        Ok(None)
    }

    /// Entry by position among all entries
    pub fn entry(&self, index: u64) -> StorageResult<BlockRef> {
        if index >= self.entry_count {
            return Err(StorageError::Corruption(format!(
                "Block index entry {} out of {}",
                index, self.entry_count
            )));
        }
        let leaf = *self.levels.last().ok_or_else(|| {
            StorageError::Corruption("Block index has no levels".into())
        })? as usize;
        let page = index as usize / LEAF_FANOUT;
        let slot = index as usize % LEAF_FANOUT;
        let page_start = leaf + page * PAGE_SIZE;

        let data = self.file.reader();
        let base_row_id = data.read_fixed32_at(page_start + slot * 4)?;
        let offset = data.read_fixed64_at(page_start + LEAF_FANOUT * 4 + slot * 8)? as i64;
        Ok(BlockRef {
            index,
            base_row_id,
            offset,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = StorageResult<BlockRef>> + '_ {
        (0..self.entry_count).map(move |i| self.entry(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn build(entries: &[(u32, i64)]) -> BlockIndexReader {
        let mut index = BlockIndexWriter::new();
        for &(row, offset) in entries {
            index.add(row, offset).unwrap();
        }
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::RowStoreIdxV1).unwrap();
        index.finish(&mut writer).unwrap();
        BlockIndexReader::new(MappedFile::from_vec(writer.into_inner().unwrap())).unwrap()
    }

    #[test]
    fn test_fanout() {
        assert_eq!(LEAF_FANOUT, 682);
        assert_eq!(UPPER_FANOUT, 2048);
    }

    #[test]
    fn test_single_page() {
        let reader = build(&[(0, 4), (100, 900), (250, 2000)]);
        assert_eq!(reader.level_count(), 1);
        assert_eq!(reader.len(), 3);

        let hit = reader.lookup(0).unwrap().unwrap();
        assert_eq!((hit.base_row_id, hit.offset), (0, 4));
        let hit = reader.lookup(99).unwrap().unwrap();
        assert_eq!((hit.base_row_id, hit.offset), (0, 4));
        let hit = reader.lookup(100).unwrap().unwrap();
        assert_eq!(hit.index, 1);
        let hit = reader.lookup(u32::MAX).unwrap().unwrap();
        assert_eq!((hit.base_row_id, hit.offset), (250, 2000));
    }

    #[test]
    fn test_before_first_entry() {
        let reader = build(&[(10, 0), (20, 1)]);
        assert_eq!(reader.lookup(9).unwrap(), None);
        assert_eq!(reader.lookup(10).unwrap().unwrap().base_row_id, 10);
    }

    #[test]
    fn test_empty_index() {
        let reader = build(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.level_count(), 0);
        assert_eq!(reader.lookup(0).unwrap(), None);
        assert_eq!(reader.iter().count(), 0);
    }

    #[test]
    fn test_non_increasing_rejected() {
        let mut index = BlockIndexWriter::new();
        index.add(5, 0).unwrap();
        assert!(matches!(index.add(5, 10), Err(StorageError::Encoding(_))));
        assert!(matches!(index.add(3, 10), Err(StorageError::Encoding(_))));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_random_blocks_with_sentinels() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut data = Vec::new();
        let mut entries = Vec::new();
        let mut rows = Vec::new();
        let mut row = 0u32;

        // enough blocks for several leaf pages and a second level
        for block in 0..5_000u32 {
            let size = rng.gen_range(1..40usize);
            let rows_in_block = rng.gen_range(1..50u32);
            entries.push((row, data.len() as i64));
            rows.push((row, rows_in_block, block));
            data.extend(std::iter::repeat((block % 251) as u8).take(size));
            row += rows_in_block;
        }

        let reader = build(&entries);
        assert_eq!(reader.level_count(), 2);
        assert_eq!(reader.len(), 5_000);

        for &(base, count, block) in &rows {
            for target in base..base + count {
                let hit = reader.lookup(target).unwrap().unwrap();
                assert_eq!(hit.base_row_id, base);
                assert_eq!(hit.index, block as u64);
                assert_eq!(data[hit.offset as usize], (block % 251) as u8);
            }
        }
        // past the last block still resolves to it
        let last = reader.lookup(row + 100).unwrap().unwrap();
        assert_eq!(last.index, 4_999);

        let all: Vec<BlockRef> = reader.iter().collect::<StorageResult<_>>().unwrap();
        assert_eq!(all.len(), entries.len());
        assert!(all
            .iter()
            .zip(&entries)
            .all(|(r, e)| (r.base_row_id, r.offset) == *e));
    }

    #[test]
    fn test_wrong_file_type() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::RowStoreV1).unwrap();
        BlockIndexWriter::new().finish(&mut writer).unwrap();
        assert!(matches!(
            BlockIndexReader::new(MappedFile::from_vec(writer.into_inner().unwrap())),
            Err(StorageError::InvalidFileType { .. })
        ));
    }
}
