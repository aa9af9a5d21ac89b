//! Buffered sequential binary writer
//!
//! Wraps any `Write` in a `BufWriter` and tracks the absolute byte offset of
//! the next write, which index builders record as pointers into the file.

use crate::io::header::{FileHeader, FileType};
use crate::io::varint::{encode_uvarint, zigzag_encode, MAX_VARINT_LEN};
use crate::storage::error::{StorageError, StorageResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Sequential writer with varint/fixed-width helpers
pub struct BinaryWriter<W: Write> {
    inner: BufWriter<W>,
    offset: u64,
}

impl BinaryWriter<File> {
    /// Create (truncating) a file and write its header
    pub fn create(path: impl AsRef<Path>, file_type: FileType) -> StorageResult<Self> {
        let file = File::create(path.as_ref())?;
        let mut writer = Self::new(file);
        writer.write_header(file_type)?;
        Ok(writer)
    }

    /// Flush buffers and fsync the file
    pub fn sync(self) -> StorageResult<u64> {
        let offset = self.offset;
        let file = self.into_inner()?;
        file.sync_all()?;
        Ok(offset)
    }
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(64 * 1024, inner),
            offset: 0,
        }
    }

    /// Byte offset of the next write
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> StorageResult<()> {
        self.write_raw(&[value])
    }

    /// Write an unsigned varint, returning its encoded length
    pub fn write_uvarint(&mut self, value: u64) -> StorageResult<usize> {
        let mut scratch = [0u8; MAX_VARINT_LEN];
        let n = encode_uvarint(value, &mut scratch);
        self.write_raw(&scratch[..n])?;
        Ok(n)
    }

    /// Write a zigzag-encoded signed varint
    pub fn write_varint(&mut self, value: i64) -> StorageResult<usize> {
        self.write_uvarint(zigzag_encode(value))
    }

    pub fn write_fixed32(&mut self, value: u32) -> StorageResult<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_fixed64(&mut self, value: u64) -> StorageResult<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a uvarint length prefix followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.write_uvarint(bytes.len() as u64)?;
        self.write_raw(bytes)
    }

    pub fn write_header(&mut self, file_type: FileType) -> StorageResult<()> {
        self.write_raw(&FileHeader::new(file_type).to_bytes())
    }

    /// Zero-fill up to the next multiple of `alignment` (relative to `base`)
    pub fn pad_to(&mut self, base: u64, alignment: u64) -> StorageResult<()> {
        let used = (self.offset - base) % alignment;
        if used != 0 {
            let padding = vec![0u8; (alignment - used) as usize];
            self.write_raw(&padding)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> StorageResult<W> {
        self.inner
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::varint::{uvarint, varint};

    #[test]
    fn test_offsets_track_writes() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::RowStoreV1).unwrap();
        assert_eq!(writer.offset(), 4);

        writer.write_uvarint(300).unwrap();
        assert_eq!(writer.offset(), 6);

        writer.write_fixed32(7).unwrap();
        writer.write_fixed64(9).unwrap();
        assert_eq!(writer.offset(), 18);

        writer.write_bytes(b"hello").unwrap();
        assert_eq!(writer.offset(), 24);

        let buf = writer.into_inner().unwrap();
        assert_eq!(buf.len(), 24);
        assert_eq!(&buf[0..4], b"mk\x01\x03");
        assert_eq!(uvarint(&buf[4..]).unwrap(), (300, 2));
        assert_eq!(&buf[6..10], &7u32.to_le_bytes());
        assert_eq!(&buf[18..], b"\x05hello");
    }

    #[test]
    fn test_varint_and_padding() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_varint(-3).unwrap();
        writer.pad_to(0, 8).unwrap();
        assert_eq!(writer.offset(), 8);

        // already aligned: no-op
        writer.pad_to(0, 8).unwrap();
        assert_eq!(writer.offset(), 8);

        let buf = writer.into_inner().unwrap();
        assert_eq!(varint(&buf).unwrap(), (-3, 1));
        assert!(buf[1..].iter().all(|&b| b == 0));
    }
}
