//! File header shared by every segment file
//!
//! Layout (4 bytes):
//! ```text
//! ┌──────────────┬─────────┬───────────┐
//! │ magic "mk"   │ version │ file type │
//! │ [u8; 2]      │ u8      │ u8        │
//! └──────────────┴─────────┴───────────┘
//! ```

use crate::storage::error::{StorageError, StorageResult};
use std::fmt;

/// Magic bytes for file identification
pub const MAGIC: [u8; 2] = *b"mk";

/// Current on-disk format version
pub const FORMAT_VERSION: u8 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Kind of file a header introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileType {
    PostingListV1 = 0,
    StringIndexV1 = 1,
    SkipListV1 = 2,
    RowStoreV1 = 3,
    RowStoreIdxV1 = 4,
    SegmentInfo = 5,
}

impl TryFrom<u8> for FileType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FileType::PostingListV1),
            1 => Ok(FileType::StringIndexV1),
            2 => Ok(FileType::SkipListV1),
            3 => Ok(FileType::RowStoreV1),
            4 => Ok(FileType::RowStoreIdxV1),
            5 => Ok(FileType::SegmentInfo),
            _ => Err(StorageError::InvalidHeader(format!(
                "Unknown file type: {}",
                value
            ))),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::PostingListV1 => "posting-list-v1",
            FileType::StringIndexV1 => "string-index-v1",
            FileType::SkipListV1 => "skip-list-v1",
            FileType::RowStoreV1 => "row-store-v1",
            FileType::RowStoreIdxV1 => "row-store-idx-v1",
            FileType::SegmentInfo => "segment-info",
        };
        f.write_str(name)
    }
}

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub file_type: FileType,
}

impl FileHeader {
    /// Header for a new file of the given type
    pub fn new(file_type: FileType) -> Self {
        Self {
            version: FORMAT_VERSION,
            file_type,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [MAGIC[0], MAGIC[1], self.version, self.file_type as u8]
    }

    /// Parse a header and check it introduces a file of type `expected`
    pub fn parse(buf: &[u8], expected: FileType) -> StorageResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StorageError::truncated(HEADER_SIZE, buf.len()));
        }

        if buf[0..2] != MAGIC {
            return Err(StorageError::InvalidHeader(format!(
                "Invalid magic: {:?}",
                &buf[0..2]
            )));
        }

        let version = buf[2];
        if version == 0 || version > FORMAT_VERSION {
            return Err(StorageError::InvalidHeader(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let found = buf[3];
        if found != expected as u8 {
            return Err(StorageError::InvalidFileType {
                expected: expected as u8,
                found,
            });
        }

        Ok(Self {
            version,
            file_type: expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader::new(FileType::SkipListV1);
        let bytes = header.to_bytes();
        assert_eq!(&bytes, b"mk\x01\x02");

        let parsed = FileHeader::parse(&bytes, FileType::SkipListV1).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_wrong_file_type() {
        let bytes = FileHeader::new(FileType::PostingListV1).to_bytes();
        let err = FileHeader::parse(&bytes, FileType::SkipListV1).unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidFileType {
                expected: 2,
                found: 0
            }
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let err = FileHeader::parse(b"xx\x01\x00", FileType::PostingListV1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidHeader(_)));

        let err = FileHeader::parse(b"mk\x09\x00", FileType::PostingListV1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidHeader(_)));

        let err = FileHeader::parse(b"mk", FileType::PostingListV1).unwrap_err();
        assert!(matches!(err, StorageError::TruncatedInput { .. }));
    }

    #[test]
    fn test_file_type_from_u8() {
        for tag in 0u8..=5 {
            let ft = FileType::try_from(tag).unwrap();
            assert_eq!(ft as u8, tag);
        }
        assert!(FileType::try_from(6).is_err());
    }
}
