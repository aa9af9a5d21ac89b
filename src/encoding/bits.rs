//! Bit-level writer and reader (MSB first)

use crate::storage::error::{StorageError, StorageResult};

/// Appends bits to a byte buffer, most significant bit first
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Bits still free in the last byte (0 = need a new byte)
    free: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.free == 0 {
            self.buf.push(0);
            self.free = 8;
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 1 << (self.free - 1);
        }
        self.free -= 1;
    }

    /// Write the low `count` bits of `value` (count <= 64)
    pub fn write_bits(&mut self, value: u64, count: u32) {
        let mut remaining = count;
        while remaining > 0 {
            if self.free == 0 {
                self.buf.push(0);
                self.free = 8;
            }
            let take = remaining.min(self.free as u32);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;
            let last = self.buf.len() - 1;
            self.buf[last] |= chunk << (self.free as u32 - take);
            self.free -= take as u8;
            remaining -= take;
        }
    }

    /// Total bits written
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 - self.free as usize
    }

    /// Finish, zero-padding the final byte
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads bits written by [`BitWriter`]
#[derive(Debug)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() * 8 - self.pos
    }

    pub fn read_bit(&mut self) -> StorageResult<bool> {
        if self.pos >= self.buf.len() * 8 {
            return Err(StorageError::truncated(1, 0));
        }
        let byte = self.buf[self.pos / 8];
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `count` bits (count <= 64) as the low bits of a `u64`
    pub fn read_bits(&mut self, count: u32) -> StorageResult<u64> {
        if count as usize > self.remaining() {
            return Err(StorageError::truncated(
                (count as usize).div_ceil(8),
                self.remaining() / 8,
            ));
        }
        let mut value = 0u64;
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.buf[self.pos / 8];
            let used = (self.pos % 8) as u32;
            let avail = 8 - used;
            let take = remaining.min(avail);
            let chunk = (byte >> (avail - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | chunk as u64;
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_bits(0b10110, 5);
        writer.write_bits(u64::MAX, 64);
        writer.write_bit(false);
        writer.write_bits(0x1234_5678_9abc_def0, 64);
        writer.write_bits(3, 2);
        assert_eq!(writer.bit_len(), 1 + 5 + 64 + 1 + 64 + 2);

        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 137usize.div_ceil(8));

        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(5).unwrap(), 0b10110);
        assert_eq!(reader.read_bits(64).unwrap(), u64::MAX);
        assert!(!reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(64).unwrap(), 0x1234_5678_9abc_def0);
        assert_eq!(reader.read_bits(2).unwrap(), 3);
    }

    #[test]
    fn test_read_past_end() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xff, 8);
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(8).unwrap(), 0xff);
        assert!(matches!(
            reader.read_bit(),
            Err(StorageError::TruncatedInput { .. })
        ));
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bits(9).is_err());
    }

    #[test]
    fn test_zero_width_write() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xffff, 0);
        assert_eq!(writer.bit_len(), 0);
        assert!(writer.into_bytes().is_empty());
    }
}
