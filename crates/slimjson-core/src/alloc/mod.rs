//! Chunked slab allocator with intrusive dead-cell reuse
//!
//! Every block handed out by [`PoolAllocator`] is addressed by a [`Handle`]:
//! a chunk index plus a byte offset inside that chunk, or a fallback index
//! for requests larger than a chunk. Handles never move while the block is
//! live, so containers and string records reference each other by handle
//! instead of by address.

mod backend;
mod chunk;
mod pool;

pub use backend::{Backend, BoundedBackend, HeapBackend};
pub use pool::{Addressing, ArenaStats, PoolAllocator};

use std::fmt;

const NONE_CHUNK: u32 = u32::MAX;
const FALLBACK_FLAG: u32 = 1 << 31;

/// Location of a block (or of a byte inside a block) owned by a [`PoolAllocator`]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    chunk: u32,
    offset: u32,
}

impl Handle {
    /// Handle referencing nothing
    pub const NONE: Handle = Handle {
        chunk: NONE_CHUNK,
        offset: 0,
    };

    /// Size of an encoded handle
    pub const ENCODED_SIZE: usize = 8;

    pub(crate) const fn in_chunk(index: u32, offset: u32) -> Self {
        Self {
            chunk: index,
            offset,
        }
    }

    pub(crate) const fn in_fallback(index: u32, offset: u32) -> Self {
        Self {
            chunk: index | FALLBACK_FLAG,
            offset,
        }
    }

    /// Whether this handle references nothing
    #[inline]
    pub const fn is_none(self) -> bool {
        self.chunk == NONE_CHUNK
    }

    /// Whether this handle points into an individually allocated fallback block
    #[inline]
    pub const fn is_fallback(self) -> bool {
        !self.is_none() && self.chunk & FALLBACK_FLAG != 0
    }

    /// Chunk index, if the handle points into a chunk
    #[inline]
    pub const fn chunk_index(self) -> Option<usize> {
        if self.is_none() || self.is_fallback() {
            None
        } else {
            Some(self.chunk as usize)
        }
    }

    /// Fallback index, if the handle points into a fallback block
    #[inline]
    pub const fn fallback_index(self) -> Option<usize> {
        if self.is_fallback() {
            Some((self.chunk & !FALLBACK_FLAG) as usize)
        } else {
            None
        }
    }

    /// Byte offset inside the chunk or fallback block
    #[inline]
    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// Handle `delta` bytes further into the same block
    #[inline]
    pub const fn add(self, delta: usize) -> Self {
        Self {
            chunk: self.chunk,
            offset: self.offset + delta as u32,
        }
    }

    /// Whether both handles address the same chunk or fallback block
    #[inline]
    pub(crate) const fn same_block(self, other: Handle) -> bool {
        self.chunk == other.chunk
    }

    /// Little-endian encoding used inside arena cells
    pub fn to_bytes(self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        out[..4].copy_from_slice(&self.chunk.to_le_bytes());
        out[4..].copy_from_slice(&self.offset.to_le_bytes());
        out
    }

    /// Decode a handle written by [`Handle::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            chunk: read_u32(bytes, 0),
            offset: read_u32(bytes, 4),
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Handle(none)")
        } else if let Some(index) = self.fallback_index() {
            write!(f, "Handle(fallback {index}+{})", self.offset)
        } else {
            write!(f, "Handle({}:{})", self.chunk, self.offset)
        }
    }
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
pub(crate) fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
