//! Binary readers
//!
//! - [`BinaryReader`]: buffered sequential reads over any `Read` stream
//! - [`SliceReader`]: zero-copy random access over a borrowed byte slice,
//!   normally a memory-mapped file
//!
//! Both fail with `TruncatedInput` instead of panicking when the input ends
//! early, so a partially-written file can never crash the reading process.

use crate::io::header::{FileHeader, FileType, HEADER_SIZE};
use crate::io::varint::{uvarint, zigzag_decode, MAX_VARINT_LEN};
use crate::storage::error::{StorageError, StorageResult};
use std::io::{BufReader, ErrorKind, Read};

/// Sequential reader mirroring [`BinaryWriter`](crate::io::BinaryWriter)
pub struct BinaryReader<R: Read> {
    inner: BufReader<R>,
    offset: u64,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            offset: 0,
        }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn fill(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(StorageError::truncated(buf.len(), 0))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_u8(&mut self) -> StorageResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_uvarint(&mut self) -> StorageResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            if byte < 0x80 {
                if i == MAX_VARINT_LEN - 1 && byte > 1 {
                    return Err(StorageError::Overflow);
                }
                return Ok(value | (byte as u64) << shift);
            }
            value |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }
        Err(StorageError::Overflow)
    }

    pub fn read_varint(&mut self) -> StorageResult<i64> {
        Ok(zigzag_decode(self.read_uvarint()?))
    }

    pub fn read_fixed32(&mut self) -> StorageResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_fixed64(&mut self) -> StorageResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a uvarint length prefix followed by that many bytes
    ///
    /// The buffer grows with the bytes actually read, so a corrupt length
    /// fails with `TruncatedInput` rather than allocating up front.
    pub fn read_bytes(&mut self) -> StorageResult<Vec<u8>> {
        let len = self.read_uvarint()?;
        let mut buf = Vec::new();
        let read = self.inner.by_ref().take(len).read_to_end(&mut buf)?;
        self.offset += read as u64;
        if (read as u64) < len {
            return Err(StorageError::truncated(
                usize::try_from(len).unwrap_or(usize::MAX),
                read,
            ));
        }
        Ok(buf)
    }

    pub fn read_header(&mut self, expected: FileType) -> StorageResult<FileHeader> {
        let mut buf = [0u8; HEADER_SIZE];
        self.fill(&mut buf)?;
        FileHeader::parse(&buf, expected)
    }
}

/// Random-access reader over a borrowed byte region.
///
/// Every returned slice borrows from the underlying region; nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reader positioned at `pos`
    pub fn at(buf: &'a [u8], pos: usize) -> StorageResult<Self> {
        if pos > buf.len() {
            return Err(StorageError::truncated(pos, buf.len()));
        }
        Ok(Self { buf, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> StorageResult<()> {
        if pos > self.buf.len() {
            return Err(StorageError::truncated(pos, self.buf.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// The whole underlying region
    pub fn bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Borrow `[start, end)` without moving the cursor
    pub fn slice(&self, start: usize, end: usize) -> StorageResult<&'a [u8]> {
        if start > end || end > self.buf.len() {
            return Err(StorageError::truncated(
                end.saturating_sub(start),
                self.buf.len().saturating_sub(start),
            ));
        }
        Ok(&self.buf[start..end])
    }

    /// Borrow the next `n` bytes and advance past them
    pub fn read_slice(&mut self, n: usize) -> StorageResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(StorageError::truncated(n, self.remaining()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> StorageResult<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_uvarint(&mut self) -> StorageResult<u64> {
        let (value, n) = uvarint(&self.buf[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    pub fn read_varint(&mut self) -> StorageResult<i64> {
        Ok(zigzag_decode(self.read_uvarint()?))
    }

    pub fn read_fixed32(&mut self) -> StorageResult<u32> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> StorageResult<u64> {
        let bytes = self.read_slice(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a uvarint length prefix and borrow that many bytes
    pub fn read_bytes(&mut self) -> StorageResult<&'a [u8]> {
        let len = self.read_uvarint()?;
        let len = usize::try_from(len)
            .map_err(|_| StorageError::Corruption(format!("Length prefix too large: {}", len)))?;
        self.read_slice(len)
    }

    pub fn read_header(&mut self, expected: FileType) -> StorageResult<FileHeader> {
        let bytes = self.read_slice(HEADER_SIZE)?;
        FileHeader::parse(bytes, expected)
    }

    /// Fixed 32-bit read at an absolute offset, cursor unchanged
    pub fn read_fixed32_at(&self, offset: usize) -> StorageResult<u32> {
        SliceReader::at(self.buf, offset)?.read_fixed32()
    }

    /// Fixed 64-bit read at an absolute offset, cursor unchanged
    pub fn read_fixed64_at(&self, offset: usize) -> StorageResult<u64> {
        SliceReader::at(self.buf, offset)?.read_fixed64()
    }

    /// Reader over the same region positioned at `offset`
    pub fn read_at(&self, offset: usize) -> StorageResult<SliceReader<'a>> {
        SliceReader::at(self.buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writer::BinaryWriter;

    fn sample() -> Vec<u8> {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_header(FileType::PostingListV1).unwrap();
        writer.write_uvarint(1 << 20).unwrap();
        writer.write_varint(-42).unwrap();
        writer.write_fixed32(0xdead_beef).unwrap();
        writer.write_fixed64(u64::MAX - 1).unwrap();
        writer.write_bytes(b"payload").unwrap();
        writer.write_u8(7).unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_stream_reader_mirrors_writer() {
        let buf = sample();
        let mut reader = BinaryReader::new(buf.as_slice());
        reader.read_header(FileType::PostingListV1).unwrap();
        assert_eq!(reader.read_uvarint().unwrap(), 1 << 20);
        assert_eq!(reader.read_varint().unwrap(), -42);
        assert_eq!(reader.read_fixed32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_fixed64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_bytes().unwrap(), b"payload");
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.offset(), buf.len() as u64);

        let err = reader.read_u8().unwrap_err();
        assert!(matches!(err, StorageError::TruncatedInput { .. }));
    }

    #[test]
    fn test_stream_reader_corrupt_length() {
        // length prefix of u64::MAX followed by three bytes
        let mut buf = vec![0xffu8; 9];
        buf.extend_from_slice(&[0x01, b'a', b'b', b'c']);
        let mut reader = BinaryReader::new(buf.as_slice());
        let err = reader.read_bytes().unwrap_err();
        assert!(matches!(
            err,
            StorageError::TruncatedInput { remaining: 3, .. }
        ));
        assert_eq!(reader.offset(), buf.len() as u64);
    }

    #[test]
    fn test_slice_reader_mirrors_writer() {
        let buf = sample();
        let mut reader = SliceReader::new(&buf);
        reader.read_header(FileType::PostingListV1).unwrap();
        assert_eq!(reader.read_uvarint().unwrap(), 1 << 20);
        assert_eq!(reader.read_varint().unwrap(), -42);
        assert_eq!(reader.read_fixed32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_fixed64().unwrap(), u64::MAX - 1);
        let payload = reader.read_bytes().unwrap();
        assert_eq!(payload, b"payload");
        // zero copy: borrowed from the same region
        assert!(std::ptr::eq(payload.as_ptr(), buf[buf.len() - 8..].as_ptr()));
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_slice_reader_truncation() {
        let buf = [1u8, 2, 3];
        let mut reader = SliceReader::new(&buf);
        let err = reader.read_fixed64().unwrap_err();
        assert!(matches!(
            err,
            StorageError::TruncatedInput {
                needed: 8,
                remaining: 3
            }
        ));
        // failed read leaves the cursor untouched
        assert_eq!(reader.position(), 0);

        assert!(reader.slice(2, 5).is_err());
        assert!(SliceReader::at(&buf, 4).is_err());

        let mut prefixed = SliceReader::new(&[10u8, 1, 2]);
        assert!(matches!(
            prefixed.read_bytes(),
            Err(StorageError::TruncatedInput { needed: 10, remaining: 2 })
        ));
    }

    #[test]
    fn test_random_access() {
        let buf = sample();
        let reader = SliceReader::new(&buf);
        // trailing: fixed32, fixed64, len-prefixed payload (8), u8 (1)
        let fixed_at = buf.len() - 1 - 8 - 8 - 4;
        assert_eq!(reader.read_fixed32_at(fixed_at).unwrap(), 0xdead_beef);
        assert_eq!(reader.read_fixed64_at(fixed_at + 4).unwrap(), u64::MAX - 1);
        assert_eq!(reader.slice(0, 2).unwrap(), b"mk");
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_wrong_header_type() {
        let buf = sample();
        let mut reader = SliceReader::new(&buf);
        let err = reader.read_header(FileType::SkipListV1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidFileType { .. }));
    }
}
