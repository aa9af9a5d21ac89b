//! Index structures
//!
//! - **posting**: roaring-bitmap posting lists and their `.pos` store
//! - **btrie**: burst trie from text/keyword terms to postings (`.ipos`)
//! - **skiplist**: skip list from numeric values to postings (`.ipos`)
//! - **block_index**: multi-level row id → page offset index (`.ipag`)
//!
//! # Architecture
//!
//! ```text
//! lookup "status = 500"
//!        ↓
//! .ipos (trie / skip list): value → posting offset
//!        ↓
//! .pos: posting offset → RoaringBitmap of row ids
//!
//! scan rows [a, b)
//!        ↓
//! .ipag: row id a → (base row id, page offset)
//!        ↓
//! .pag: decode pages from that offset on
//! ```

pub mod block_index;
pub mod btrie;
pub mod posting;
pub mod skiplist;

pub use block_index::{BlockIndexReader, BlockIndexWriter, BlockRef};
pub use btrie::{BurstTrie, TrieReader};
pub use posting::{PostingId, PostingReader, PostingStore};
pub use skiplist::{
    Comparator, FloatComparator, IntComparator, SkipList, SkipListReader, ValueIndex,
};
