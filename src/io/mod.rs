//! Binary I/O primitives
//!
//! Everything on disk is built from these pieces:
//!
//! - **varint**: unsigned and zigzag varints
//! - **header**: 4-byte file header (`"mk"`, version, file type)
//! - **writer**: buffered sequential writer tracking byte offsets
//! - **reader**: sequential stream reader and zero-copy slice reader
//! - **mmap**: reference-counted read-only mapping

pub mod header;
pub mod mmap;
pub mod reader;
pub mod varint;
pub mod writer;

pub use header::{FileHeader, FileType, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use mmap::MappedFile;
pub use reader::{BinaryReader, SliceReader};
pub use varint::{put_uvarint, put_varint, uvarint, varint, zigzag_decode, zigzag_encode};
pub use writer::BinaryWriter;
