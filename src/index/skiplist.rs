//! Probabilistic skip list over scalar keys
//!
//! Nodes live in an arena and link to each other by index. The head is a
//! sentinel holding one forward pointer per level; `NIL` plays the tail.
//! Removal unlinks the node, then moves the last arena slot into the hole
//! and re-points that node's predecessors.
//!
//! `.ipos` layout (`SkipListV1`), nodes written from the last node back to
//! the head so every forward pointer references an already-written node:
//! ```text
//! node   := [key][uvarint posting_offset][u8 level][fixed64 forward]*level
//! footer := [fixed64 len][fixed64 head_offset][fixed64 level_count]
//! ```
//! A forward offset of 0 is the tail. The head is written with
//! `Comparator::min_key()`.

use std::cmp::Ordering;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;

use crate::index::posting::{PostingId, PostingStore};
use crate::io::header::FileType;
use crate::io::mmap::MappedFile;
use crate::io::reader::SliceReader;
use crate::io::writer::BinaryWriter;
use crate::storage::error::{StorageError, StorageResult};

pub const DEFAULT_MAX_LEVEL: usize = 16;
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Hard ceiling; the on-disk level is a single byte
const LEVEL_LIMIT: usize = 32;
const FOOTER_SIZE: usize = 24;

const HEAD: usize = usize::MAX - 1;
const NIL: usize = usize::MAX;

/// Key ordering plus on-disk key encoding
pub trait Comparator {
    type Key: Copy + fmt::Debug;

    fn compare(a: &Self::Key, b: &Self::Key) -> Ordering;
    fn min_key() -> Self::Key;
    fn max_key() -> Self::Key;
    fn write_key<W: Write>(key: &Self::Key, writer: &mut BinaryWriter<W>) -> StorageResult<()>;
    fn read_key(reader: &mut SliceReader<'_>) -> StorageResult<Self::Key>;
}

/// `i64` keys, zigzag varint on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct IntComparator;

impl Comparator for IntComparator {
    type Key = i64;

    fn compare(a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn min_key() -> i64 {
        i64::MIN
    }

    fn max_key() -> i64 {
        i64::MAX
    }

    fn write_key<W: Write>(key: &i64, writer: &mut BinaryWriter<W>) -> StorageResult<()> {
        writer.write_varint(*key)?;
        Ok(())
    }

    fn read_key(reader: &mut SliceReader<'_>) -> StorageResult<i64> {
        reader.read_varint()
    }
}

/// `f64` keys in IEEE total order, fixed 64-bit on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatComparator;

impl Comparator for FloatComparator {
    type Key = f64;

    fn compare(a: &f64, b: &f64) -> Ordering {
        a.total_cmp(b)
    }

    fn min_key() -> f64 {
        f64::NEG_INFINITY
    }

    fn max_key() -> f64 {
        f64::INFINITY
    }

    fn write_key<W: Write>(key: &f64, writer: &mut BinaryWriter<W>) -> StorageResult<()> {
        writer.write_fixed64(key.to_bits())
    }

    fn read_key(reader: &mut SliceReader<'_>) -> StorageResult<f64> {
        Ok(f64::from_bits(reader.read_fixed64()?))
    }
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    forward: Vec<usize>,
}

pub struct SkipList<C: Comparator, V> {
    nodes: Vec<Node<C::Key, V>>,
    head: Vec<usize>,
    level: usize,
    max_level: usize,
    probability: f64,
    rng: StdRng,
    _cmp: PhantomData<C>,
}

impl<C: Comparator, V: fmt::Debug> fmt::Debug for SkipList<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<C: Comparator, V> Default for SkipList<C, V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL, DEFAULT_PROBABILITY)
    }
}

impl<C: Comparator, V> SkipList<C, V> {
    pub fn new(max_level: usize, probability: f64) -> Self {
        Self::with_rng(max_level, probability, StdRng::from_entropy())
    }

    /// Deterministic level sequence
    pub fn with_seed(max_level: usize, probability: f64, seed: u64) -> Self {
        Self::with_rng(max_level, probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_level: usize, probability: f64, rng: StdRng) -> Self {
        let max_level = max_level.clamp(1, LEVEL_LIMIT);
        Self {
            nodes: Vec::new(),
            head: vec![NIL; max_level],
            level: 1,
            max_level,
            probability: probability.clamp(0.0, 1.0),
            rng,
            _cmp: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Levels currently in use
    pub fn level(&self) -> usize {
        self.level
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < self.max_level && self.rng.gen::<f64>() < self.probability {
            level += 1;
        }
        level
    }

    fn next(&self, at: usize, level: usize) -> usize {
        if at == HEAD {
            self.head[level]
        } else {
            self.nodes[at].forward[level]
        }
    }

    fn set_next(&mut self, at: usize, level: usize, to: usize) {
        if at == HEAD {
            self.head[level] = to;
        } else {
            self.nodes[at].forward[level] = to;
        }
    }

    /// Rightmost node strictly before `key` on every level
    fn predecessors(&self, key: &C::Key) -> Vec<usize> {
        let mut update = vec![HEAD; self.max_level];
        let mut x = HEAD;
        for level in (0..self.level).rev() {
            loop {
                let next = self.next(x, level);
                if next != NIL && C::compare(&self.nodes[next].key, key) == Ordering::Less {
                    x = next;
                } else {
                    break;
                }
            }
            update[level] = x;
        }
        update
    }

    fn find(&self, key: &C::Key) -> Option<usize> {
        let update = self.predecessors(key);
        let candidate = self.next(update[0], 0);
        (candidate != NIL && C::compare(&self.nodes[candidate].key, key) == Ordering::Equal)
            .then_some(candidate)
    }

    /// Value for `key`, inserting `make()` first when absent. The flag is
    /// true when a new node was created.
    pub fn get_or_insert_with<F>(&mut self, key: C::Key, make: F) -> (&mut V, bool)
    where
        F: FnOnce() -> V,
    {
        let mut update = self.predecessors(&key);
        let candidate = self.next(update[0], 0);
        if candidate != NIL && C::compare(&self.nodes[candidate].key, &key) == Ordering::Equal {
            return (&mut self.nodes[candidate].value, false);
        }

        let level = self.random_level();
        if level > self.level {
            for slot in update.iter_mut().take(level).skip(self.level) {
                *slot = HEAD;
            }
            self.level = level;
        }

        let id = self.nodes.len();
        let forward = (0..level).map(|l| self.next(update[l], l)).collect();
        self.nodes.push(Node {
            key,
            value: make(),
            forward,
        });
        for (l, &pred) in update.iter().enumerate().take(level) {
            self.set_next(pred, l, id);
        }
        (&mut self.nodes[id].value, true)
    }

    /// Insert `make()` under a new key, or run `update` on the existing value.
    /// Returns true when the key was new.
    pub fn insert_or_update<F, U>(&mut self, key: C::Key, make: F, update: U) -> bool
    where
        F: FnOnce() -> V,
        U: FnOnce(&mut V),
    {
        let (value, inserted) = self.get_or_insert_with(key, make);
        if !inserted {
            update(value);
        }
        inserted
    }

    pub fn search(&self, key: &C::Key) -> Option<&V> {
        self.find(key).map(|i| &self.nodes[i].value)
    }

    pub fn remove(&mut self, key: &C::Key) -> Option<V> {
        let update = self.predecessors(key);
        let target = self.next(update[0], 0);
        if target == NIL || C::compare(&self.nodes[target].key, key) != Ordering::Equal {
            return None;
        }

        for (l, &pred) in update.iter().enumerate().take(self.level) {
            if self.next(pred, l) != target {
                break;
            }
            let after = self.nodes[target].forward[l];
            self.set_next(pred, l, after);
        }
        while self.level > 1 && self.head[self.level - 1] == NIL {
            self.level -= 1;
        }

        // Fill the hole with the last slot so the arena stays dense
        let last = self.nodes.len() - 1;
        if target != last {
            let moved_key = self.nodes[last].key;
            let preds = self.predecessors(&moved_key);
            for l in 0..self.nodes[last].forward.len() {
                self.set_next(preds[l], l, target);
            }
        }
        Some(self.nodes.swap_remove(target).value)
    }

    /// Entries in key order
    pub fn iter(&self) -> Iter<'_, C, V> {
        Iter {
            list: self,
            at: self.head[0],
        }
    }

    /// Keys in `[lo, hi]`, in order
    pub fn range(&self, lo: &C::Key, hi: &C::Key) -> Vec<(&C::Key, &V)> {
        let update = self.predecessors(lo);
        let mut at = self.next(update[0], 0);
        let mut out = Vec::new();
        while at != NIL {
            let node = &self.nodes[at];
            if C::compare(&node.key, hi) == Ordering::Greater {
                break;
            }
            out.push((&node.key, &node.value));
            at = node.forward[0];
        }
        out
    }

    /// Nodes in key order (arena indices)
    fn ordered(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut at = self.head[0];
        while at != NIL {
            order.push(at);
            at = self.nodes[at].forward[0];
        }
        order
    }

    /// Serialize with `offset_of` giving each value's on-disk posting offset
    pub fn write_to<W, F>(&self, writer: &mut BinaryWriter<W>, offset_of: F) -> StorageResult<()>
    where
        W: Write,
        F: Fn(&V) -> StorageResult<u64>,
    {
        let mut offsets = vec![0u64; self.nodes.len()];
        let resolve = |offsets: &[u64], to: usize| if to == NIL { 0 } else { offsets[to] };

        for &id in self.ordered().iter().rev() {
            let node = &self.nodes[id];
            offsets[id] = writer.offset();
            C::write_key(&node.key, writer)?;
            writer.write_uvarint(offset_of(&node.value)?)?;
            writer.write_u8(node.forward.len() as u8)?;
            for &to in &node.forward {
                writer.write_fixed64(resolve(&offsets, to))?;
            }
        }

        let head_offset = writer.offset();
        C::write_key(&C::min_key(), writer)?;
        writer.write_uvarint(0)?;
        writer.write_u8(self.level as u8)?;
        for &to in self.head.iter().take(self.level) {
            writer.write_fixed64(resolve(&offsets, to))?;
        }

        writer.write_fixed64(self.nodes.len() as u64)?;
        writer.write_fixed64(head_offset)?;
        writer.write_fixed64(self.level as u64)?;
        Ok(())
    }
}

pub struct Iter<'a, C: Comparator, V> {
    list: &'a SkipList<C, V>,
    at: usize,
}

impl<'a, C: Comparator, V> Iterator for Iter<'a, C, V> {
    type Item = (&'a C::Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.at == NIL {
            return None;
        }
        let node = &self.list.nodes[self.at];
        self.at = node.forward[0];
        Some((&node.key, &node.value))
    }
}

/// Skip list of scalar values to posting lists, one per indexed numeric column
pub struct ValueIndex<C: Comparator> {
    list: SkipList<C, PostingId>,
    postings: PostingStore,
}

impl<C: Comparator> fmt::Debug for ValueIndex<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueIndex")
            .field("cardinality", &self.list.len())
            .field("level", &self.list.level())
            .finish()
    }
}

impl<C: Comparator> ValueIndex<C> {
    pub fn new(list: SkipList<C, PostingId>) -> Self {
        Self {
            list,
            postings: PostingStore::new(),
        }
    }

    pub fn insert(&mut self, key: C::Key, row_id: u32) -> StorageResult<()> {
        let postings = &mut self.postings;
        let (id, inserted) = self
            .list
            .get_or_insert_with(key, || postings.new_posting(row_id));
        if !inserted {
            let id = *id;
            postings.add(id, row_id)?;
        }
        Ok(())
    }

    pub fn lookup(&self, key: &C::Key) -> Option<&RoaringBitmap> {
        self.list.search(key).and_then(|&id| self.postings.get(id))
    }

    pub fn cardinality(&self) -> usize {
        self.list.len()
    }

    pub fn postings(&self) -> &PostingStore {
        &self.postings
    }

    pub fn write_index<W: Write>(
        &self,
        posting_offsets: &[u64],
        writer: &mut BinaryWriter<W>,
    ) -> StorageResult<()> {
        self.list.write_to(writer, |&id| {
            posting_offsets.get(id as usize).copied().ok_or_else(|| {
                StorageError::InvalidState(format!("No offset recorded for posting {}", id))
            })
        })?;
        tracing::debug!(
            cardinality = self.list.len(),
            levels = self.list.level(),
            "Skip list written"
        );
        Ok(())
    }
}

struct DiskNode<K> {
    key: K,
    posting: u64,
    level: usize,
    forwards_at: usize,
}

/// Value lookups over a mapped `.ipos` skip list file
pub struct SkipListReader<C: Comparator> {
    file: MappedFile,
    len: u64,
    head: u64,
    levels: usize,
    _cmp: PhantomData<C>,
}

impl<C: Comparator> Clone for SkipListReader<C> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            len: self.len,
            head: self.head,
            levels: self.levels,
            _cmp: PhantomData,
        }
    }
}

impl<C: Comparator> fmt::Debug for SkipListReader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipListReader")
            .field("file", &self.file)
            .field("len", &self.len)
            .field("levels", &self.levels)
            .finish()
    }
}

impl<C: Comparator> SkipListReader<C> {
    pub fn new(file: MappedFile) -> StorageResult<Self> {
        file.header(FileType::SkipListV1)?;
        let len = file.trailing_fixed64(FOOTER_SIZE)?;
        let head = file.trailing_fixed64(16)?;
        let levels = file.trailing_fixed64(8)? as usize;
        if levels == 0 || levels > LEVEL_LIMIT {
            return Err(StorageError::Corruption(format!(
                "Skip list declares {} levels",
                levels
            )));
        }
        Ok(Self {
            file,
            len,
            head,
            levels,
            _cmp: PhantomData,
        })
    }

    /// Number of distinct keys
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, offset: u64) -> StorageResult<DiskNode<C::Key>> {
        let mut reader = self.file.reader().read_at(offset as usize)?;
        let key = C::read_key(&mut reader)?;
        let posting = reader.read_uvarint()?;
        let level = reader.read_u8()? as usize;
        let forwards_at = reader.position();
        reader.read_slice(level * 8)?;
        Ok(DiskNode {
            key,
            posting,
            level,
            forwards_at,
        })
    }

    fn forward(&self, node: &DiskNode<C::Key>, level: usize) -> StorageResult<u64> {
        if level >= node.level {
            return Ok(0);
        }
        self.file
            .reader()
            .read_fixed64_at(node.forwards_at + level * 8)
    }

    /// First node with key >= `key`
    fn lower_bound(&self, key: &C::Key) -> StorageResult<Option<DiskNode<C::Key>>> {
        let mut x = self.node(self.head)?;
        for level in (0..self.levels).rev() {
            loop {
                let next = self.forward(&x, level)?;
                if next == 0 {
                    break;
                }
                let candidate = self.node(next)?;
                if C::compare(&candidate.key, key) == Ordering::Less {
                    x = candidate;
                } else {
                    break;
                }
            }
        }
        match self.forward(&x, 0)? {
            0 => Ok(None),
            next => Ok(Some(self.node(next)?)),
        }
    }

    /// Posting offset stored for `key`
    pub fn search(&self, key: &C::Key) -> StorageResult<Option<u64>> {
        Ok(self
            .lower_bound(key)?
            .filter(|n| C::compare(&n.key, key) == Ordering::Equal)
            .map(|n| n.posting))
    }

    /// `(key, posting_offset)` for every key in `[lo, hi]`
    pub fn range(&self, lo: &C::Key, hi: &C::Key) -> StorageResult<Vec<(C::Key, u64)>> {
        let mut out = Vec::new();
        let mut current = self.lower_bound(lo)?;
        while let Some(node) = current {
            if C::compare(&node.key, hi) == Ordering::Greater {
                break;
            }
            out.push((node.key, node.posting));
            current = match self.forward(&node, 0)? {
                0 => None,
                next => Some(self.node(next)?),
            };
        }
        Ok(out)
    }
}
