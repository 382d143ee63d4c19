//! Deduplicating string table

use super::record::{self, HEADER_SIZE, Header, RecordFlags};
use super::{StrId, StrInput};
use crate::alloc::{Backend, Handle, HeapBackend, PoolAllocator, read_u32, write_u32};
use crate::config::limits::{BUCKET_GROWTH, INITIAL_BUCKET_COUNT, MAX_STRING_LEN, grown};
use crate::config::{ArenaConfig, InternConfig};
use crate::error::{Error, Result};
use ahash::RandomState;
use bytes::Bytes;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::hash::BuildHasher;
use std::rc::Rc;
use tracing::debug;

/// String pool shared by several documents
pub type SharedStringPool<B = HeapBackend> = Rc<RefCell<StringPool<B>>>;

/// Snapshot of string pool usage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoolStats {
    /// Interned strings
    pub strings: usize,
    /// Strings flagged as object keys
    pub keys: usize,
    /// Sum of content lengths
    pub total_bytes: usize,
    /// Bucket array length
    pub buckets: usize,
    /// Buckets with at least one record
    pub used_buckets: usize,
    /// Longest chain
    pub longest_chain: usize,
    /// Mean length of non-empty chains
    pub mean_chain: f64,
}

/// Separate-chaining intern table over a stable-addressing arena
///
/// Chains are sorted by (length, bytes) so a probe stops at the first record
/// ordering after it. The bucket array itself is an arena block of
/// handles.
#[derive(Debug)]
pub struct StringPool<B: Backend = HeapBackend> {
    arena: PoolAllocator<B>,
    hasher: RandomState,
    buckets: Handle,
    bucket_count: usize,
    len: usize,
    max_load_factor: f32,
    initial_buckets: usize,
    shared: Vec<Option<Bytes>>,
    free_shared: Vec<u32>,
}

impl Default for StringPool<HeapBackend> {
    fn default() -> Self {
        Self::build(HeapBackend::new(), InternConfig::default())
    }
}

impl<B: Backend> StringPool<B> {
    /// Create a pool drawing record memory from `backend`
    pub fn new(backend: B, config: InternConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(backend, config))
    }

    /// Wrap a new pool for sharing between documents
    pub fn shared(backend: B, config: InternConfig) -> Result<SharedStringPool<B>> {
        Ok(Rc::new(RefCell::new(Self::new(backend, config)?)))
    }

    pub(crate) fn build(backend: B, config: InternConfig) -> Self {
        let arena_config = ArenaConfig {
            chunk_size: config.chunk_size,
            ..ArenaConfig::default()
        };
        let initial_buckets = match config.initial_bucket_count {
            0 => INITIAL_BUCKET_COUNT as usize,
            n => n as usize,
        };
        Self {
            arena: PoolAllocator::stable(backend, arena_config),
            hasher: RandomState::new(),
            buckets: Handle::NONE,
            bucket_count: 0,
            len: 0,
            max_load_factor: config.max_load_factor,
            initial_buckets,
            shared: Vec::new(),
            free_shared: Vec::new(),
        }
    }

    /// Record arena
    pub fn arena(&self) -> &PoolAllocator<B> {
        &self.arena
    }

    /// Backend shared with the record arena
    pub fn backend(&self) -> &B {
        self.arena.backend()
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pool holds no strings
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the bucket array
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Average chain length over all buckets
    pub fn load_factor(&self) -> f32 {
        if self.bucket_count == 0 {
            0.0
        } else {
            self.len as f32 / self.bucket_count as f32
        }
    }

    /// Load factor above which an insertion grows the table
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Change the growth threshold; applies from the next insertion
    pub fn set_max_load_factor(&mut self, factor: f32) -> Result<()> {
        if factor.is_nan() || factor <= 0.0 {
            return Err(Error::config(format!(
                "max load factor must be positive, got {factor}"
            )));
        }
        self.max_load_factor = factor;
        Ok(())
    }

    /// Look up `content` without inserting
    pub fn get(&self, content: impl AsRef<[u8]>) -> Option<StrId> {
        let content = content.as_ref();
        self.lookup(self.hasher.hash_one(content), content)
    }

    /// Return the string equal to `input`, interning it first if needed.
    ///
    /// The flag reports whether the string already existed. Passing
    /// `is_key` marks the string as an object key for the rest of its life.
    pub fn provide<'a>(
        &mut self,
        input: impl Into<StrInput<'a>>,
        is_key: bool,
    ) -> Result<(StrId, bool)> {
        let input = input.into();
        let content = input.as_bytes();
        if content.len() > MAX_STRING_LEN {
            return Err(Error::StringTooLong(content.len()));
        }
        let hash = self.hasher.hash_one(content);
        if let Some(id) = self.lookup(hash, content) {
            if is_key {
                record::set_flags(self.arena.bytes_mut(id.handle(), HEADER_SIZE), RecordFlags::KEY);
            }
            return Ok((id, true));
        }

        if (self.len + 1) as f64 > self.bucket_count as f64 * f64::from(self.max_load_factor) {
            self.grow()?;
        }
        let handle = self.write_record(input, is_key)?;
        self.link(handle, hash);
        self.len += 1;
        Ok((StrId::from_handle(handle), false))
    }

    /// Content of an interned string; stale ids resolve to an empty slice
    pub fn resolve(&self, id: StrId) -> &[u8] {
        if id.handle().is_none() {
            return &[];
        }
        self.content(id.handle())
    }

    /// Whether the string has ever been used as an object key
    pub fn is_key(&self, id: StrId) -> bool {
        self.flags(id).contains(RecordFlags::KEY)
    }

    /// Whether the content was copied into pool storage
    pub fn owns(&self, id: StrId) -> bool {
        self.flags(id).contains(RecordFlags::OWNED)
    }

    /// Iterate over every interned string in bucket order
    pub fn iter(&self) -> Iter<'_, B> {
        Iter {
            pool: self,
            bucket: 0,
            cur: Handle::NONE,
        }
    }

    /// Free every string never used as a key; returns how many were freed
    pub fn release_values(&mut self) -> usize {
        let mut released = 0usize;
        for index in 0..self.bucket_count {
            let mut prev: Option<Handle> = None;
            let mut cur = self.bucket(index);
            while !cur.is_none() {
                let header = self.header(cur);
                if header.flags.contains(RecordFlags::KEY) {
                    prev = Some(cur);
                } else {
                    match prev {
                        Some(p) => {
                            record::write_next(self.arena.bytes_mut(p, HEADER_SIZE), header.next);
                        }
                        None => self.set_bucket(index, header.next),
                    }
                    self.free_record(cur, &header);
                    released += 1;
                }
                cur = header.next;
            }
        }
        self.len -= released;
        if released > 0 {
            debug!(released, remaining = self.len, "released value strings");
        }
        released
    }

    /// Drop every string; chunk buffers stay allocated until [`StringPool::shrink`]
    pub fn clear(&mut self) {
        self.arena.clear();
        self.buckets = Handle::NONE;
        self.bucket_count = 0;
        self.len = 0;
        self.shared.clear();
        self.free_shared.clear();
        debug!("cleared string pool");
    }

    /// Return unused memory; with `rehash`, also fit the bucket array to
    /// the current length when it has outgrown a chunk
    pub fn shrink(&mut self, rehash: bool) -> Result<()> {
        if self.len == 0 {
            if !self.buckets.is_none() {
                self.arena
                    .deallocate(self.buckets, self.bucket_count * Handle::ENCODED_SIZE);
                self.buckets = Handle::NONE;
                self.bucket_count = 0;
            }
        } else if rehash {
            let target = (self.len as f64 / f64::from(self.max_load_factor)).ceil().max(1.0) as usize;
            if target < self.bucket_count
                && !self
                    .arena
                    .is_chunkable(self.bucket_count * Handle::ENCODED_SIZE)
            {
                self.rehash(target)?;
            }
        }
        self.arena.shrink();

        while matches!(self.shared.last(), Some(None)) {
            self.shared.pop();
        }
        let live = self.shared.len() as u32;
        self.free_shared.retain(|&slot| slot < live);
        self.shared.shrink_to_fit();
        self.free_shared.shrink_to_fit();
        Ok(())
    }

    /// Usage snapshot
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            strings: self.len,
            buckets: self.bucket_count,
            ..PoolStats::default()
        };
        for index in 0..self.bucket_count {
            let mut chain = 0usize;
            let mut cur = self.bucket(index);
            while !cur.is_none() {
                let header = self.header(cur);
                if header.flags.contains(RecordFlags::KEY) {
                    stats.keys += 1;
                }
                stats.total_bytes += header.len as usize;
                chain += 1;
                cur = header.next;
            }
            if chain > 0 {
                stats.used_buckets += 1;
                stats.longest_chain = stats.longest_chain.max(chain);
            }
        }
        if stats.used_buckets > 0 {
            stats.mean_chain = self.len as f64 / stats.used_buckets as f64;
        }
        stats
    }

    /// Check chain order, bucket placement and the string count
    pub fn verify(&self) -> std::result::Result<(), String> {
        let mut count = 0usize;
        for index in 0..self.bucket_count {
            let mut prev: Option<&[u8]> = None;
            let mut cur = self.bucket(index);
            while !cur.is_none() {
                let content = self.content(cur);
                if self.bucket_index(self.hasher.hash_one(content)) != index {
                    return Err(format!("string in bucket {index} hashes elsewhere"));
                }
                if let Some(prev) = prev
                    && record::compare(prev, content) != Ordering::Less
                {
                    return Err(format!("chain {index} is out of order"));
                }
                prev = Some(content);
                count += 1;
                if count > self.len {
                    return Err(format!("more records than the {} counted", self.len));
                }
                cur = self.header(cur).next;
            }
        }
        if count != self.len {
            return Err(format!("found {count} records, counted {}", self.len));
        }
        self.arena.verify()
    }

    fn lookup(&self, hash: u64, content: &[u8]) -> Option<StrId> {
        if self.bucket_count == 0 {
            return None;
        }
        let mut cur = self.bucket(self.bucket_index(hash));
        while !cur.is_none() {
            match record::compare(self.content(cur), content) {
                Ordering::Equal => return Some(StrId::from_handle(cur)),
                Ordering::Greater => return None,
                Ordering::Less => cur = self.header(cur).next,
            }
        }
        None
    }

    /// Splice `handle` into its chain, keeping the chain sorted
    fn link(&mut self, handle: Handle, hash: u64) {
        let index = self.bucket_index(hash);
        let (prev, next) = {
            let probe = self.content(handle);
            let mut prev = None;
            let mut cur = self.bucket(index);
            while !cur.is_none() && record::compare(self.content(cur), probe) == Ordering::Less {
                prev = Some(cur);
                cur = self.header(cur).next;
            }
            (prev, cur)
        };
        record::write_next(self.arena.bytes_mut(handle, HEADER_SIZE), next);
        match prev {
            Some(p) => record::write_next(self.arena.bytes_mut(p, HEADER_SIZE), handle),
            None => self.set_bucket(index, handle),
        }
    }

    fn grow(&mut self) -> Result<()> {
        let next = if self.bucket_count == 0 {
            self.initial_buckets
        } else {
            grown(self.bucket_count, BUCKET_GROWTH)
        };
        let needed = ((self.len + 1) as f64 / f64::from(self.max_load_factor)).ceil() as usize;
        self.rehash(next.max(needed))
    }

    fn rehash(&mut self, count: usize) -> Result<()> {
        let records: Vec<Handle> = self.iter().map(StrId::handle).collect();
        let size = count * Handle::ENCODED_SIZE;
        let block = self.arena.allocate(size)?;
        let none = Handle::NONE.to_bytes();
        for slot in self.arena.bytes_mut(block, size).chunks_exact_mut(Handle::ENCODED_SIZE) {
            slot.copy_from_slice(&none);
        }

        let (old, old_count) = (self.buckets, self.bucket_count);
        self.buckets = block;
        self.bucket_count = count;
        for handle in records {
            let hash = self.hasher.hash_one(self.content(handle));
            self.link(handle, hash);
        }
        self.arena.deallocate(old, old_count * Handle::ENCODED_SIZE);
        debug!(from = old_count, to = count, strings = self.len, "rehashed string pool");
        Ok(())
    }

    fn write_record(&mut self, input: StrInput<'_>, is_key: bool) -> Result<Handle> {
        let len = input.len();
        let owned = matches!(input, StrInput::Borrowed(_));
        let size = record::record_size(len, owned);
        let handle = self.arena.allocate(size)?;

        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::OWNED, owned);
        flags.set(RecordFlags::KEY, is_key);
        let header = Header {
            flags,
            len: len as u32,
            next: Handle::NONE,
        };
        match input {
            StrInput::Borrowed(content) => {
                let bytes = self.arena.bytes_mut(handle, size);
                header.write(bytes);
                bytes[HEADER_SIZE..].copy_from_slice(content);
            }
            StrInput::Shared(content) => {
                let slot = self.store_shared(content);
                let bytes = self.arena.bytes_mut(handle, size);
                header.write(bytes);
                write_u32(bytes, HEADER_SIZE, slot);
            }
        }
        Ok(handle)
    }

    fn free_record(&mut self, handle: Handle, header: &Header) {
        if !header.flags.contains(RecordFlags::OWNED) {
            let slot = read_u32(self.arena.bytes(handle.add(HEADER_SIZE), 4), 0);
            if let Some(entry) = self.shared.get_mut(slot as usize) {
                *entry = None;
                self.free_shared.push(slot);
            }
        }
        self.arena.deallocate(handle, header.record_size());
    }

    fn store_shared(&mut self, content: Bytes) -> u32 {
        match self.free_shared.pop() {
            Some(slot) => {
                self.shared[slot as usize] = Some(content);
                slot
            }
            None => {
                self.shared.push(Some(content));
                (self.shared.len() - 1) as u32
            }
        }
    }

    fn content(&self, handle: Handle) -> &[u8] {
        let Some(head) = self.arena.get_bytes(handle, HEADER_SIZE) else {
            return &[];
        };
        let header = Header::read(head);
        let payload = handle.add(HEADER_SIZE);
        if header.flags.contains(RecordFlags::OWNED) {
            self.arena
                .get_bytes(payload, header.len as usize)
                .unwrap_or(&[])
        } else {
            self.arena
                .get_bytes(payload, 4)
                .and_then(|raw| self.shared.get(read_u32(raw, 0) as usize))
                .and_then(Option::as_deref)
                .unwrap_or(&[])
        }
    }

    fn header(&self, handle: Handle) -> Header {
        Header::read(self.arena.bytes(handle, HEADER_SIZE))
    }

    fn flags(&self, id: StrId) -> RecordFlags {
        if id.handle().is_none() {
            return RecordFlags::empty();
        }
        self.arena
            .get_bytes(id.handle(), HEADER_SIZE)
            .map_or(RecordFlags::empty(), |bytes| Header::read(bytes).flags)
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.bucket_count as u64) as usize
    }

    fn bucket(&self, index: usize) -> Handle {
        let slot = self.buckets.add(index * Handle::ENCODED_SIZE);
        Handle::from_bytes(self.arena.bytes(slot, Handle::ENCODED_SIZE))
    }

    fn set_bucket(&mut self, index: usize, head: Handle) {
        let slot = self.buckets.add(index * Handle::ENCODED_SIZE);
        self.arena
            .bytes_mut(slot, Handle::ENCODED_SIZE)
            .copy_from_slice(&head.to_bytes());
    }
}

/// Iterator over the strings of a [`StringPool`]
pub struct Iter<'a, B: Backend> {
    pool: &'a StringPool<B>,
    bucket: usize,
    cur: Handle,
}

impl<B: Backend> Iterator for Iter<'_, B> {
    type Item = StrId;

    fn next(&mut self) -> Option<StrId> {
        loop {
            if !self.cur.is_none() {
                let handle = self.cur;
                self.cur = self.pool.header(handle).next;
                return Some(StrId::from_handle(handle));
            }
            if self.bucket >= self.pool.bucket_count {
                return None;
            }
            self.cur = self.pool.bucket(self.bucket);
            self.bucket += 1;
        }
    }
}
