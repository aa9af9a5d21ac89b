//! Burst trie over byte-string terms
//!
//! Each node keeps an optional posting for the key ending exactly at it, a
//! map of child nodes by next byte, and a bucket of `suffix -> posting`
//! entries for keys that have not been split out yet. A bucket never holds
//! more than `max_bucket_size` entries: a new suffix arriving at a full
//! bucket bursts it, moving every entry that shares the suffix's first byte
//! into a new child (an empty remainder becomes the child's own value), and
//! the insert continues in that child.
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index.
//!
//! `.ipos` layout (`StringIndexV1`), nodes written post-order so child
//! offsets are known before their parent:
//! ```text
//! node   := [uvarint value_posting_offset + 1 (0 = none)]
//!           [uvarint child_count] ([u8 byte][uvarint child_offset])*
//!           [uvarint bucket_len]  ([bytes suffix][uvarint posting_offset])*
//! footer := [fixed64 cardinality][fixed64 root_offset]
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use roaring::RoaringBitmap;

use crate::index::posting::{PostingId, PostingStore};
use crate::io::header::FileType;
use crate::io::mmap::MappedFile;
use crate::io::writer::BinaryWriter;
use crate::storage::error::{StorageError, StorageResult};

/// Default bucket size before a node bursts
pub const DEFAULT_MAX_BUCKET_SIZE: usize = 64;

const FOOTER_SIZE: usize = 16;

type NodeId = usize;

#[derive(Debug, Default)]
struct Node {
    value: Option<PostingId>,
    children: BTreeMap<u8, NodeId>,
    bucket: BTreeMap<Vec<u8>, PostingId>,
}

#[derive(Debug)]
pub struct BurstTrie {
    nodes: Vec<Node>,
    postings: PostingStore,
    max_bucket_size: usize,
    cardinality: usize,
}

impl Default for BurstTrie {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUCKET_SIZE)
    }
}

impl BurstTrie {
    pub fn new(max_bucket_size: usize) -> Self {
        Self {
            nodes: vec![Node::default()],
            postings: PostingStore::new(),
            max_bucket_size: max_bucket_size.max(1),
            cardinality: 0,
        }
    }

    /// Number of distinct keys
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn postings(&self) -> &PostingStore {
        &self.postings
    }

    /// Record `row_id` under `key`
    pub fn insert(&mut self, key: &[u8], row_id: u32) -> StorageResult<()> {
        let mut node = 0;
        let mut rest = key;

        loop {
            let Some((&first, tail)) = rest.split_first() else {
                match self.nodes[node].value {
                    Some(id) => self.postings.add(id, row_id)?,
                    None => {
                        self.nodes[node].value = Some(self.postings.new_posting(row_id));
                        self.cardinality += 1;
                    }
                }
                return Ok(());
            };

            if let Some(&child) = self.nodes[node].children.get(&first) {
                node = child;
                rest = tail;
                continue;
            }

            if let Some(&id) = self.nodes[node].bucket.get(rest) {
                return self.postings.add(id, row_id);
            }

            if self.nodes[node].bucket.len() >= self.max_bucket_size {
                node = self.burst(node, first);
                rest = tail;
                continue;
            }

            let id = self.postings.new_posting(row_id);
            self.nodes[node].bucket.insert(rest.to_vec(), id);
            self.cardinality += 1;
            return Ok(());
        }
    }

    /// Split every bucket entry starting with `byte` into a new child
    fn burst(&mut self, node: NodeId, byte: u8) -> NodeId {
        let moved: Vec<Vec<u8>> = self.nodes[node]
            .bucket
            .keys()
            .filter(|suffix| suffix.first() == Some(&byte))
            .cloned()
            .collect();

        let mut child = Node::default();
        for suffix in moved {
            if let Some(id) = self.nodes[node].bucket.remove(&suffix) {
                if suffix.len() == 1 {
                    child.value = Some(id);
                } else {
                    child.bucket.insert(suffix[1..].to_vec(), id);
                }
            }
        }

        self.nodes.push(child);
        let child = self.nodes.len() - 1;
        self.nodes[node].children.insert(byte, child);
        child
    }

    fn find(&self, key: &[u8]) -> Option<PostingId> {
        let mut node = 0;
        let mut rest = key;
        loop {
            let Some((first, tail)) = rest.split_first() else {
                return self.nodes[node].value;
            };
            match self.nodes[node].children.get(first) {
                Some(&child) => {
                    node = child;
                    rest = tail;
                }
                None => return self.nodes[node].bucket.get(rest).copied(),
            }
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&RoaringBitmap> {
        self.find(key).and_then(|id| self.postings.get(id))
    }

    /// Every key with its posting id, in byte order
    #[cfg(test)]
    fn terms(&self) -> Vec<(Vec<u8>, PostingId)> {
        let mut out = Vec::with_capacity(self.cardinality);
        let mut stack = vec![(0usize, Vec::new())];
        while let Some((node, prefix)) = stack.pop() {
            let n = &self.nodes[node];
            if let Some(id) = n.value {
                out.push((prefix.clone(), id));
            }
            for (suffix, &id) in &n.bucket {
                let mut key = prefix.clone();
                key.extend_from_slice(suffix);
                out.push((key, id));
            }
            for (&byte, &child) in &n.children {
                let mut key = prefix.clone();
                key.push(byte);
                stack.push((child, key));
            }
        }
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Serialize the trie; `posting_offsets` maps posting ids to `.pos` offsets
    pub fn write_index<W: Write>(
        &self,
        posting_offsets: &[u64],
        writer: &mut BinaryWriter<W>,
    ) -> StorageResult<()> {
        let posting_offset = |id: PostingId| -> StorageResult<u64> {
            posting_offsets.get(id as usize).copied().ok_or_else(|| {
                StorageError::InvalidState(format!("No offset recorded for posting {}", id))
            })
        };

        let mut offsets = vec![0u64; self.nodes.len()];
        let mut stack = vec![(0usize, false)];
        while let Some((node, expanded)) = stack.pop() {
            let n = &self.nodes[node];
            if !expanded {
                stack.push((node, true));
                stack.extend(n.children.values().map(|&c| (c, false)));
                continue;
            }

            offsets[node] = writer.offset();
            match n.value {
                Some(id) => writer.write_uvarint(posting_offset(id)? + 1)?,
                None => writer.write_uvarint(0)?,
            };
            writer.write_uvarint(n.children.len() as u64)?;
            for (&byte, &child) in &n.children {
                writer.write_u8(byte)?;
                writer.write_uvarint(offsets[child])?;
            }
            writer.write_uvarint(n.bucket.len() as u64)?;
            for (suffix, &id) in &n.bucket {
                writer.write_bytes(suffix)?;
                writer.write_uvarint(posting_offset(id)?)?;
            }
        }

        writer.write_fixed64(self.cardinality as u64)?;
        writer.write_fixed64(offsets[0])?;
        tracing::debug!(
            nodes = self.nodes.len(),
            cardinality = self.cardinality,
            "Burst trie written"
        );
        Ok(())
    }
}

/// Term lookups over a mapped `.ipos` trie file
#[derive(Debug, Clone)]
pub struct TrieReader {
    file: MappedFile,
    root: u64,
    cardinality: u64,
}

impl TrieReader {
    pub fn new(file: MappedFile) -> StorageResult<Self> {
        file.header(FileType::StringIndexV1)?;
        let cardinality = file.trailing_fixed64(FOOTER_SIZE)?;
        let root = file.trailing_fixed64(8)?;
        if root as usize >= file.len() - FOOTER_SIZE {
            return Err(StorageError::Corruption(format!(
                "Trie root offset {} outside file of {} bytes",
                root,
                file.len()
            )));
        }
        Ok(Self {
            file,
            root,
            cardinality,
        })
    }

    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    /// Posting offset stored for `key`
    pub fn lookup(&self, key: &[u8]) -> StorageResult<Option<u64>> {
        let data = self.file.reader();
        let mut offset = self.root;
        let mut rest = key;

        'nodes: loop {
            let mut node = data.read_at(offset as usize)?;
            let value = node.read_uvarint()?;
            if rest.is_empty() {
                return Ok(value.checked_sub(1));
            }

            let child_count = node.read_uvarint()?;
            for _ in 0..child_count {
                let byte = node.read_u8()?;
                let child = node.read_uvarint()?;
                if byte == rest[0] {
                    offset = child;
                    rest = &rest[1..];
                    continue 'nodes;
                }
            }

            let bucket_len = node.read_uvarint()?;
            for _ in 0..bucket_len {
                let suffix = node.read_bytes()?;
                let posting = node.read_uvarint()?;
                if suffix == rest {
                    return Ok(Some(posting));
                }
            }
            return Ok(None);
        }
    }
}
