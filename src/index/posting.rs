//! Posting lists backed by roaring bitmaps
//!
//! A [`PostingStore`] owns every row-id set produced while indexing one
//! column. Indexes refer to a posting by its [`PostingId`] while building, and
//! by its byte offset in the `.pos` file once flushed.
//!
//! `.pos` layout:
//! ```text
//! [header: PostingListV1]
//! ([uvarint size][roaring portable serialization])*
//! ```

use std::io::Write;

use roaring::RoaringBitmap;

use crate::io::header::FileType;
use crate::io::mmap::MappedFile;
use crate::io::writer::BinaryWriter;
use crate::storage::error::{StorageError, StorageResult};

/// Index of a posting list inside its [`PostingStore`]
pub type PostingId = u32;

#[derive(Debug, Default)]
pub struct PostingStore {
    lists: Vec<RoaringBitmap>,
}

impl PostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new posting list containing `row_id`
    pub fn new_posting(&mut self, row_id: u32) -> PostingId {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(row_id);
        self.lists.push(bitmap);
        (self.lists.len() - 1) as PostingId
    }

    pub fn add(&mut self, id: PostingId, row_id: u32) -> StorageResult<()> {
        let bitmap = self.lists.get_mut(id as usize).ok_or_else(|| {
            StorageError::InvalidState(format!("Unknown posting id {}", id))
        })?;
        bitmap.insert(row_id);
        Ok(())
    }

    pub fn get(&self, id: PostingId) -> Option<&RoaringBitmap> {
        self.lists.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Write every posting in creation order, returning their file offsets
    /// indexed by [`PostingId`]
    pub fn flush<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StorageResult<Vec<u64>> {
        let mut offsets = Vec::with_capacity(self.lists.len());
        let mut buf = Vec::new();
        for bitmap in &self.lists {
            offsets.push(writer.offset());
            buf.clear();
            bitmap.serialize_into(&mut buf)?;
            writer.write_bytes(&buf)?;
        }
        tracing::debug!(postings = self.lists.len(), "Posting lists flushed");
        Ok(offsets)
    }
}

/// Reads posting lists straight out of a mapped `.pos` file
#[derive(Debug, Clone)]
pub struct PostingReader {
    file: MappedFile,
}

impl PostingReader {
    pub fn new(file: MappedFile) -> StorageResult<Self> {
        file.header(FileType::PostingListV1)?;
        Ok(Self { file })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        Self::new(MappedFile::open(path)?)
    }

    pub fn read(&self, offset: u64) -> StorageResult<RoaringBitmap> {
        let mut reader = self.file.reader().read_at(offset as usize)?;
        let bytes = reader.read_bytes()?;
        RoaringBitmap::deserialize_from(bytes).map_err(|e| {
            StorageError::Corruption(format!("Bad posting list at offset {}: {}", offset, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_builds_lists() {
        let mut store = PostingStore::new();
        let a = store.new_posting(3);
        let b = store.new_posting(1);
        store.add(a, 7).unwrap();
        store.add(a, 3).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a).unwrap().iter().collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(store.get(b).unwrap().len(), 1);
        assert!(store.get(9).is_none());
        assert!(matches!(
            store.add(9, 1),
            Err(StorageError::InvalidState(_))
        ));
    }

    #[test]
    fn test_flush_and_read_back() {
        let mut store = PostingStore::new();
        let dense = store.new_posting(0);
        for row in 1..10_000 {
            store.add(dense, row).unwrap();
        }
        let sparse = store.new_posting(5);
        store.add(sparse, 4_000_000).unwrap();

        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::PostingListV1).unwrap();
        let offsets = store.flush(&mut writer).unwrap();
        let file = MappedFile::from_vec(writer.into_inner().unwrap());

        let reader = PostingReader::new(file).unwrap();
        let restored = reader.read(offsets[dense as usize]).unwrap();
        assert_eq!(restored.len(), 10_000);
        let restored = reader.read(offsets[sparse as usize]).unwrap();
        assert_eq!(restored.iter().collect::<Vec<_>>(), vec![5, 4_000_000]);
    }

    #[test]
    fn test_wrong_file_type() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::SkipListV1).unwrap();
        let file = MappedFile::from_vec(writer.into_inner().unwrap());
        assert!(matches!(
            PostingReader::new(file),
            Err(StorageError::InvalidFileType { .. })
        ));
    }
}
