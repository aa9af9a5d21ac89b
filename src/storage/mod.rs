//! Segment storage
//!
//! - **types**: schema (`IndexInfo`, `FieldInfo`, `FieldType`), `Value`, `Event`
//! - **column**: in-memory typed columns and the text tokenizer
//! - **segment**: `Segment` lifecycle plus the `SegmentSource`/`ColumnScan` traits
//! - **writer**: per-column page, page index and value index files
//! - **reader**: `read_segment`, memory-mapped `SegmentReader`/`ColumnReader`
//! - **error**: error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Event → validate → Columns → sort by _time → pages + indexes → info
//!
//! Read Path:
//!   info (crc) → .ipag → page → decode
//!              → .ipos → posting offset → .pos → row ids
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mkstore::storage::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = IndexInfo::new("web")
//!         .with_field("host", FieldType::Keyword, true)?
//!         .with_field("status", FieldType::Int, true)?;
//!
//!     let mut segment = Segment::new(info);
//!     segment.add(&Event::new(1_700_000_000_000).with("host", "a").with("status", 200i64))?;
//!     segment.write("./data/web-0001")?;
//!     segment.close()?;
//!
//!     let reader = read_segment("./data/web-0001")?;
//!     if let Some(rows) = reader.column("host").map(|c| c.lookup(&Value::from("a"))).transpose()? {
//!         println!("{:?}", rows);
//!     }
//!     Ok(())
//! }
//! ```

pub mod column;
pub mod error;
pub mod reader;
pub mod segment;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use column::{tokenize, Column, ColumnValues};
pub use error::{StorageError, StorageResult};
pub use reader::{read_segment, ColumnReader, ColumnStats, Page, PageHeader, SegmentReader, SegmentStats};
pub use segment::{ColumnScan, Segment, SegmentSource, SegmentState};
pub use types::{Event, FieldInfo, FieldType, IndexInfo, Value, TIME_FIELD};
pub use writer::{WriteOptions, INFO_FILE};
