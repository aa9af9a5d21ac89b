//! Reference-counted read-only file mapping
//!
//! A [`MappedFile`] owns the mapping behind an `Arc`. Every reader built over
//! a segment file holds its own clone, so the region stays mapped until the
//! last reader is dropped and no borrowed slice can outlive it.

use crate::io::header::{FileHeader, FileType, HEADER_SIZE};
use crate::io::reader::SliceReader;
use crate::storage::error::{StorageError, StorageResult};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => &map[..],
            Backing::Owned(buf) => buf.as_slice(),
        }
    }
}

/// Shared handle to an immutable byte region
#[derive(Clone)]
pub struct MappedFile {
    backing: Arc<Backing>,
    path: Arc<PathBuf>,
}

impl MappedFile {
    /// Map an existing file read-only
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(StorageError::truncated(HEADER_SIZE, 0));
        }

        // SAFETY: segment files are immutable once written; the mapping is
        // read-only and nothing in this crate truncates or rewrites them.
        let map = unsafe { Mmap::map(&file)? };

        Ok(Self {
            backing: Arc::new(Backing::Mapped(map)),
            path: Arc::new(path),
        })
    }

    /// Map a file and validate its header
    pub fn open_typed(path: impl AsRef<Path>, expected: FileType) -> StorageResult<Self> {
        let file = Self::open(path)?;
        file.header(expected)?;
        Ok(file)
    }

    /// Serve an owned buffer through the same interface
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self {
            backing: Arc::new(Backing::Owned(buf)),
            path: Arc::new(PathBuf::from("<memory>")),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.backing.as_slice()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cursor over the whole region
    pub fn reader(&self) -> SliceReader<'_> {
        SliceReader::new(self.as_slice())
    }

    /// Parse and validate the leading header
    pub fn header(&self, expected: FileType) -> StorageResult<FileHeader> {
        FileHeader::parse(self.as_slice(), expected)
    }

    /// Fixed 64-bit word located `back` bytes before the end of the region
    pub fn trailing_fixed64(&self, back: usize) -> StorageResult<u64> {
        let len = self.len();
        if back < 8 || back > len {
            return Err(StorageError::truncated(back, len));
        }
        self.reader().read_fixed64_at(len - back)
    }

    /// Number of live handles sharing this region
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.backing)
    }
}

impl fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writer::BinaryWriter;
    use tempfile::tempdir;

    #[test]
    fn test_map_and_validate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.pos");

        let mut writer = BinaryWriter::create(&path, FileType::PostingListV1).unwrap();
        writer.write_fixed64(42).unwrap();
        writer.sync().unwrap();

        let file = MappedFile::open_typed(&path, FileType::PostingListV1).unwrap();
        assert_eq!(file.len(), 12);
        assert_eq!(file.trailing_fixed64(8).unwrap(), 42);

        let err = MappedFile::open_typed(&path, FileType::SkipListV1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidFileType { .. }));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            MappedFile::open(&path),
            Err(StorageError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_handles_share_region() {
        let file = MappedFile::from_vec(vec![1, 2, 3]);
        let clone = file.clone();
        assert_eq!(file.handle_count(), 2);
        assert!(std::ptr::eq(file.as_slice().as_ptr(), clone.as_slice().as_ptr()));
        drop(file);
        assert_eq!(clone.handle_count(), 1);
        assert_eq!(clone.as_slice(), &[1, 2, 3]);
    }
}
