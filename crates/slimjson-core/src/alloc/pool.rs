//! Pool allocator: a growable table of chunks plus fallback blocks

use super::backend::{Backend, HeapBackend};
use super::chunk::{Chunk, Release};
use super::{Handle, write_u32};
use crate::config::ArenaConfig;
use crate::config::limits::{BIG_HEADER_SIZE, CHUNK_TABLE_GROWTH, align_cell, grown};
use crate::error::{Error, Result};
use tracing::{debug, error, trace};

/// How the chunk table behaves on [`PoolAllocator::shrink`]
///
/// Handles are `(chunk index, offset)` pairs in both modes, so no live block
/// ever moves. The modes differ only in what a shrink may release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Addressing {
    /// Empty chunks are returned individually and their table slots reused
    Compacting,
    /// Chunk indices are never recycled; shrink releases all or nothing
    Stable,
}

/// Snapshot of arena usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Chunks currently holding a buffer
    pub chunks: usize,
    /// Slots reserved in the chunk table
    pub chunk_capacity: usize,
    /// Live fallback blocks
    pub fallbacks: usize,
    /// Bytes in live blocks (chunks and fallbacks)
    pub allocated_bytes: usize,
    /// Bytes left in bump regions
    pub direct_available: usize,
    /// Number of dead cells across all chunks
    pub dead_cells: usize,
    /// Bytes held by dead cells
    pub dead_bytes: usize,
}

impl ArenaStats {
    /// Share of chunk bytes below the bump pointers that are dead
    pub fn fragmentation_ratio(&self) -> f64 {
        let chunk_live = self.allocated_bytes + self.dead_bytes;
        if chunk_live == 0 {
            0.0
        } else {
            self.dead_bytes as f64 / chunk_live as f64
        }
    }
}

/// Chunked slab allocator handing out [`Handle`]s
///
/// Requests up to the configured chunk size are served, in order of
/// preference, from the current chunk's bump region, the current chunk's
/// dead cells, any other chunk's bump region, any other chunk's dead cells,
/// and finally a new chunk. Larger requests become fallback blocks taken
/// directly from the backend.
#[derive(Debug)]
pub struct PoolAllocator<B: Backend = HeapBackend> {
    backend: B,
    config: ArenaConfig,
    addressing: Addressing,
    chunks: Vec<Chunk>,
    current: usize,
    total_dead: usize,
    fallbacks: Vec<Option<Box<[u8]>>>,
    free_fallbacks: Vec<u32>,
}

impl Default for PoolAllocator<HeapBackend> {
    fn default() -> Self {
        Self::new(
            HeapBackend::new(),
            ArenaConfig::default(),
            Addressing::Compacting,
        )
    }
}

impl<B: Backend> PoolAllocator<B> {
    /// Create an allocator drawing memory from `backend`
    pub fn new(backend: B, config: ArenaConfig, addressing: Addressing) -> Self {
        Self {
            backend,
            config,
            addressing,
            chunks: Vec::new(),
            current: 0,
            total_dead: 0,
            fallbacks: Vec::new(),
            free_fallbacks: Vec::new(),
        }
    }

    /// Allocator for object storage
    pub fn compacting(backend: B, config: ArenaConfig) -> Self {
        Self::new(backend, config, Addressing::Compacting)
    }

    /// Allocator for string records
    pub fn stable(backend: B, config: ArenaConfig) -> Self {
        Self::new(backend, config, Addressing::Stable)
    }

    /// Backend shared with this allocator
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Active configuration
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Addressing mode fixed at construction
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Size above which requests become fallback blocks
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size as usize
    }

    /// Whether a request of `size` bytes is served from a chunk
    pub fn is_chunkable(&self, size: usize) -> bool {
        align_cell(size) <= self.chunk_size()
    }

    /// Allocate `size` bytes; zero-sized requests return [`Handle::NONE`]
    pub fn allocate(&mut self, size: usize) -> Result<Handle> {
        if size == 0 {
            return Ok(Handle::NONE);
        }
        let size = align_cell(size);
        if size > self.chunk_size() {
            return self.allocate_fallback(size);
        }

        let size = size as u32;
        if let Some(handle) = self.allocate_in_chunks(size) {
            return Ok(handle);
        }
        if self.config.pack_dead_cells && self.total_dead >= size as usize {
            self.pack();
            if let Some(handle) = self.allocate_in_chunks(size) {
                return Ok(handle);
            }
        }
        self.allocate_in_new_chunk(size)
    }

    /// Return a block; `size` must match the size it was allocated with
    /// (or describe a tail range of a chunk block)
    pub fn deallocate(&mut self, handle: Handle, size: usize) {
        if handle.is_none() || size == 0 {
            return;
        }
        let size = align_cell(size);

        if let Some(index) = handle.fallback_index() {
            debug_assert_eq!(handle.offset(), 0, "fallback released from its middle");
            match self.fallbacks.get_mut(index).and_then(Option::take) {
                Some(block) => {
                    debug_assert_eq!(block.len(), size, "fallback size mismatch");
                    self.backend.deallocate(block);
                    self.free_fallbacks.push(index as u32);
                }
                None => debug_assert!(false, "fallback {index} released twice"),
            }
            return;
        }

        let Some(index) = handle.chunk_index() else {
            return;
        };
        let Some(chunk) = self.chunks.get_mut(index) else {
            debug_assert!(false, "release into unknown chunk {index}");
            return;
        };
        let dead_before = chunk.total_dead() as usize;
        let outcome = chunk.release(handle.offset(), size as u32);
        self.total_dead = self.total_dead - dead_before + chunk.total_dead() as usize;

        if outcome == Release::Emptied && index == self.current {
            self.leave_empty_chunk(index);
        }

        if self.config.verify
            && let Err(err) = self.verify()
        {
            error!(%err, "arena free list corrupted");
            debug_assert!(false, "arena free list corrupted: {err}");
        }
    }

    /// Grow or shrink a block without moving it.
    ///
    /// Only the block ending at its chunk's bump pointer can be resized,
    /// and only while the new size still fits the chunk.
    pub fn realloc_in_place(&mut self, handle: Handle, old_size: usize, new_size: usize) -> bool {
        let Some(index) = handle.chunk_index() else {
            return false;
        };
        let (old_size, new_size) = (align_cell(old_size), align_cell(new_size));
        if new_size == 0 || new_size > self.chunk_size() {
            return false;
        }
        match self.chunks.get_mut(index) {
            Some(chunk) => chunk.realloc_in_place(handle.offset(), old_size as u32, new_size as u32),
            None => false,
        }
    }

    /// Copy `bytes` into a freshly allocated block
    pub fn commit(&mut self, bytes: &[u8]) -> Result<Handle> {
        let handle = self.allocate(bytes.len())?;
        if !bytes.is_empty() {
            self.bytes_mut(handle, bytes.len()).copy_from_slice(bytes);
        }
        Ok(handle)
    }

    /// Copy `bytes` into a fresh big-layout block whose header records
    /// `capacity`
    pub fn commit_big(&mut self, capacity: u32, bytes: &[u8]) -> Result<Handle> {
        let handle = self.allocate(BIG_HEADER_SIZE + bytes.len())?;
        let block = self.bytes_mut(handle, BIG_HEADER_SIZE + bytes.len());
        write_u32(block, 0, capacity);
        block[BIG_HEADER_SIZE..].copy_from_slice(bytes);
        Ok(handle)
    }

    /// Read `len` bytes starting at `handle`
    pub fn bytes(&self, handle: Handle, len: usize) -> &[u8] {
        let start = handle.offset() as usize;
        &self.block(handle)[start..start + len]
    }

    /// Read `len` bytes starting at `handle`, or `None` if the range falls
    /// outside its block
    pub fn get_bytes(&self, handle: Handle, len: usize) -> Option<&[u8]> {
        let start = handle.offset() as usize;
        self.block(handle).get(start..start.checked_add(len)?)
    }

    /// Mutable view of `len` bytes starting at `handle`
    pub fn bytes_mut(&mut self, handle: Handle, len: usize) -> &mut [u8] {
        let start = handle.offset() as usize;
        &mut self.block_mut(handle)[start..start + len]
    }

    /// Copy `len` bytes from `src` to `dst`; ranges inside one block may overlap
    pub fn copy(&mut self, src: Handle, dst: Handle, len: usize) {
        if len == 0 || src == dst {
            return;
        }
        let (from, to) = (src.offset() as usize, dst.offset() as usize);
        if src.same_block(dst) {
            self.block_mut(src).copy_within(from..from + len, to);
            return;
        }
        let (source, target) = self.block_pair(src, dst);
        target[to..to + len].copy_from_slice(&source[from..from + len]);
    }

    /// Reset every chunk and free every fallback block; chunk buffers are kept
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            chunk.reset();
        }
        self.total_dead = 0;
        self.current = 0;
        for block in self.fallbacks.drain(..).flatten() {
            self.backend.deallocate(block);
        }
        self.free_fallbacks.clear();
    }

    /// Return every buffer to the backend
    pub fn release_all(&mut self) {
        self.clear();
        for mut chunk in self.chunks.drain(..) {
            if !chunk.is_vacant() {
                self.backend.deallocate(chunk.take_data());
            }
        }
        self.chunks = Vec::new();
        self.fallbacks = Vec::new();
        self.free_fallbacks = Vec::new();
    }

    /// Give unused memory back to the backend
    pub fn shrink(&mut self) {
        match self.addressing {
            Addressing::Stable => {
                if self.allocated_bytes() == 0 {
                    self.release_all();
                }
            }
            Addressing::Compacting => {
                let mut released = 0usize;
                for chunk in &mut self.chunks {
                    if !chunk.is_vacant() && chunk.is_empty() {
                        self.backend.deallocate(chunk.take_data());
                        released += 1;
                    }
                }
                while self.chunks.last().is_some_and(Chunk::is_vacant) {
                    self.chunks.pop();
                }
                self.chunks.shrink_to_fit();
                if self.chunks.get(self.current).is_none_or(Chunk::is_vacant) {
                    self.current = self
                        .chunks
                        .iter()
                        .rposition(|chunk| !chunk.is_vacant())
                        .unwrap_or(0);
                }
                if released > 0 {
                    debug!(released, remaining = self.chunk_count(), "released empty chunks");
                }
            }
        }

        while matches!(self.fallbacks.last(), Some(None)) {
            self.fallbacks.pop();
        }
        let live = self.fallbacks.len() as u32;
        self.free_fallbacks.retain(|&index| index < live);
        self.fallbacks.shrink_to_fit();
        self.free_fallbacks.shrink_to_fit();
    }

    /// Coalesce adjacent dead cells in every chunk
    pub fn pack(&mut self) -> usize {
        let mut reclaimed = 0usize;
        for chunk in &mut self.chunks {
            reclaimed += chunk.pack() as usize;
        }
        self.total_dead -= reclaimed;
        if reclaimed > 0 {
            trace!(reclaimed, "packed dead cells");
        }
        reclaimed
    }

    /// Check every chunk's free list and the global dead counter
    pub fn verify(&self) -> std::result::Result<(), String> {
        let mut dead = 0usize;
        for (index, chunk) in self.chunks.iter().enumerate() {
            chunk
                .verify()
                .map_err(|err| format!("chunk {index}: {err}"))?;
            dead += chunk.total_dead() as usize;
        }
        if dead != self.total_dead {
            return Err(format!(
                "dead bytes {dead} disagree with counter {}",
                self.total_dead
            ));
        }
        if let Some(&index) = self
            .free_fallbacks
            .iter()
            .find(|&&index| self.fallbacks.get(index as usize).is_none_or(Option::is_some))
        {
            return Err(format!("free fallback slot {index} is occupied"));
        }
        Ok(())
    }

    /// Chunks currently holding a buffer
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.is_vacant()).count()
    }

    /// Slots reserved in the chunk table
    pub fn chunk_capacity(&self) -> usize {
        self.chunks.capacity()
    }

    /// Live fallback blocks
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.iter().filter(|block| block.is_some()).count()
    }

    /// Bytes in live blocks
    pub fn allocated_bytes(&self) -> usize {
        let in_chunks: usize = self
            .chunks
            .iter()
            .map(|chunk| chunk.live_bytes() as usize)
            .sum();
        let in_fallbacks: usize = self.fallbacks.iter().flatten().map(|block| block.len()).sum();
        in_chunks + in_fallbacks
    }

    /// Bytes left in bump regions
    pub fn direct_available(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.direct_available() as usize)
            .sum()
    }

    /// Number of dead cells
    pub fn dead_cell_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.dead_cells().count()).sum()
    }

    /// Bytes held by dead cells
    pub fn dead_bytes(&self) -> usize {
        self.total_dead
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            chunks: self.chunk_count(),
            chunk_capacity: self.chunk_capacity(),
            fallbacks: self.fallback_count(),
            allocated_bytes: self.allocated_bytes(),
            direct_available: self.direct_available(),
            dead_cells: self.dead_cell_count(),
            dead_bytes: self.dead_bytes(),
        }
    }

    fn allocate_in_chunks(&mut self, size: u32) -> Option<Handle> {
        let current = self.current;
        if let Some(chunk) = self.chunks.get_mut(current) {
            if let Some(pos) = chunk.bump(size) {
                return Some(Handle::in_chunk(current as u32, pos));
            }
            if let Some(pos) = chunk.take_dead(size) {
                self.total_dead -= size as usize;
                return Some(Handle::in_chunk(current as u32, pos));
            }
        }

        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            if index == current {
                continue;
            }
            if let Some(pos) = chunk.bump(size) {
                self.current = index;
                return Some(Handle::in_chunk(index as u32, pos));
            }
        }

        if self.total_dead >= size as usize {
            for (index, chunk) in self.chunks.iter_mut().enumerate() {
                if index == current {
                    continue;
                }
                if let Some(pos) = chunk.take_dead(size) {
                    self.total_dead -= size as usize;
                    return Some(Handle::in_chunk(index as u32, pos));
                }
            }
        }
        None
    }

    fn allocate_in_new_chunk(&mut self, size: u32) -> Result<Handle> {
        let data = self.backend.allocate(self.chunk_size())?;
        let vacant = match self.addressing {
            Addressing::Compacting => self.chunks.iter().position(Chunk::is_vacant),
            Addressing::Stable => None,
        };
        let index = match vacant {
            Some(index) => {
                self.chunks[index] = Chunk::new(data);
                index
            }
            None => {
                if self.chunks.len() == self.chunks.capacity() {
                    let target = grown(self.chunks.capacity(), CHUNK_TABLE_GROWTH);
                    self.chunks.reserve_exact(target - self.chunks.len());
                }
                self.chunks.push(Chunk::new(data));
                self.chunks.len() - 1
            }
        };
        debug!(
            index,
            chunk_size = self.chunk_size(),
            addressing = ?self.addressing,
            "allocated arena chunk"
        );

        self.current = index;
        let pos = self.chunks[index]
            .bump(size)
            .ok_or_else(|| Error::exhausted(size as usize, self.chunk_size()))?;
        Ok(Handle::in_chunk(index as u32, pos))
    }

    fn allocate_fallback(&mut self, size: usize) -> Result<Handle> {
        let block = self.backend.allocate(size)?;
        let index = match self.free_fallbacks.pop() {
            Some(index) => {
                self.fallbacks[index as usize] = Some(block);
                index
            }
            None => {
                self.fallbacks.push(Some(block));
                (self.fallbacks.len() - 1) as u32
            }
        };
        trace!(size, index, "allocated fallback block");
        Ok(Handle::in_fallback(index, 0))
    }

    fn leave_empty_chunk(&mut self, index: usize) {
        let usable = |chunk: &Chunk| !chunk.is_vacant() && !chunk.is_full();
        if let Some(prev) = index.checked_sub(1)
            && self.chunks.get(prev).is_some_and(usable)
        {
            self.current = prev;
        } else if self.chunks.get(index + 1).is_some_and(usable) {
            self.current = index + 1;
        }
    }

    fn block(&self, handle: Handle) -> &[u8] {
        if let Some(index) = handle.fallback_index() {
            return self
                .fallbacks
                .get(index)
                .and_then(Option::as_deref)
                .unwrap_or(&[]);
        }
        handle
            .chunk_index()
            .and_then(|index| self.chunks.get(index))
            .map_or(&[][..], Chunk::data)
    }

    fn block_mut(&mut self, handle: Handle) -> &mut [u8] {
        if let Some(index) = handle.fallback_index() {
            return self
                .fallbacks
                .get_mut(index)
                .and_then(Option::as_deref_mut)
                .unwrap_or(&mut []);
        }
        match handle.chunk_index().and_then(|index| self.chunks.get_mut(index)) {
            Some(chunk) => chunk.data_mut(),
            None => &mut [],
        }
    }

    /// Borrow two distinct blocks at once
    fn block_pair(&mut self, src: Handle, dst: Handle) -> (&[u8], &mut [u8]) {
        match (src.fallback_index(), dst.fallback_index()) {
            (Some(a), Some(b)) => {
                let (source, target) = pair_mut(&mut self.fallbacks, a, b);
                (
                    source.as_deref().unwrap_or(&[]),
                    target.as_deref_mut().unwrap_or(&mut []),
                )
            }
            (Some(a), None) => {
                let source = self.fallbacks[a].as_deref().unwrap_or(&[]);
                let target = chunk_data_mut(&mut self.chunks, dst);
                (source, target)
            }
            (None, Some(b)) => {
                let target = self.fallbacks[b].as_deref_mut().unwrap_or(&mut []);
                let source = src
                    .chunk_index()
                    .and_then(|index| self.chunks.get(index))
                    .map_or(&[][..], Chunk::data);
                (source, target)
            }
            (None, None) => {
                let (Some(a), Some(b)) = (src.chunk_index(), dst.chunk_index()) else {
                    return (&[], &mut []);
                };
                let (source, target) = pair_mut(&mut self.chunks, a, b);
                (source.data(), target.data_mut())
            }
        }
    }
}

impl<B: Backend> Drop for PoolAllocator<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn chunk_data_mut(chunks: &mut [Chunk], handle: Handle) -> &mut [u8] {
    match handle.chunk_index().and_then(|index| chunks.get_mut(index)) {
        Some(chunk) => chunk.data_mut(),
        None => &mut [],
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
