//! # mkstore
//!
//! Columnar segment storage for log and event analytics. Events are batched
//! into immutable, memory-mapped segments: one directory per segment, one
//! set of files per field.
//!
//! ## Features
//!
//! - **Per-column codecs**: plain, varint, RLE, double-delta, dictionary,
//!   XOR floats, Snappy and LZ4, chosen from the data at write time
//! - **Value indexes**: burst trie for strings, skip list for numbers, both
//!   pointing at roaring posting lists
//! - **Row-id index**: multi-level 8 KiB block index from row id to page
//! - **Zero-copy reads**: segment files are memory mapped and shared
//!
//! ## Modules
//!
//! - [`io`]: varints, file headers, buffered writer, mapped reader
//! - [`encoding`]: column codecs and encoding selection
//! - [`index`]: posting store, burst trie, skip list, block index
//! - [`storage`]: segment lifecycle, writer and reader
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mkstore::storage::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = IndexInfo::new("logs")
//!         .with_field("level", FieldType::Keyword, true)?
//!         .with_field("message", FieldType::Text, true)?;
//!
//!     let mut segment = Segment::new(info);
//!     segment.add(
//!         &Event::new(1_700_000_000_000)
//!             .with("level", "error")
//!             .with("message", "disk full on /var"),
//!     )?;
//!     segment.write("./data/logs-0001")?;
//!     segment.close()?;
//!
//!     let reader = segment.open()?;
//!     let message = reader.column("message").ok_or("no message column")?;
//!     println!("{:?}", message.lookup(&Value::from("disk"))?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encoding;
pub mod index;
pub mod io;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    read_segment, ColumnScan, Event, FieldInfo, FieldType, IndexInfo, Segment, SegmentReader,
    SegmentSource, SegmentState, StorageError, StorageResult, Value,
};

pub use encoding::{ByteCompression, EncodingKind};

pub use config::{Config, ConfigError, IndexConfig, LoggingConfig, StorageConfig};
