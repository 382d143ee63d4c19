//! Container headers and the small/big capacity encoding
//!
//! A container keeps its size and a 16-bit capacity inline. Once the
//! capacity reaches [`SMALL_CAPACITY_LIMIT`] the inline field holds
//! [`BIG_CAPACITY_MARKER`] and the real capacity moves into the first word of
//! the element block, followed by [`BIG_HEADER_SIZE`] bytes of header.

use crate::alloc::{Backend, Handle, PoolAllocator, read_u32};
use crate::config::limits::{
    BIG_CAPACITY_MARKER, BIG_HEADER_SIZE, MEMBER_SIZE, SMALL_CAPACITY_LIMIT, VALUE_SIZE,
};

/// Element layout of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Elem {
    /// Full value cell (generic arrays)
    Value,
    /// Key handle plus value cell (objects)
    Member,
    /// One byte per boolean
    Bool,
    /// Little-endian `i64`
    Int,
    /// Little-endian `f64` bits
    Double,
}

impl Elem {
    /// Bytes per element
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Elem::Value => VALUE_SIZE,
            Elem::Member => MEMBER_SIZE,
            Elem::Bool => 1,
            Elem::Int | Elem::Double => 8,
        }
    }

    /// Bytes needed for a block of `capacity` elements
    #[inline]
    pub const fn block_size(self, capacity: u32) -> usize {
        let data = capacity as usize * self.width();
        if is_big_capacity(capacity) {
            BIG_HEADER_SIZE + data
        } else {
            data
        }
    }
}

/// Whether a container of `capacity` elements uses the big layout
#[inline]
pub const fn is_big_capacity(capacity: u32) -> bool {
    capacity >= SMALL_CAPACITY_LIMIT
}

/// Size, capacity and element block of an array or object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Container {
    block: Handle,
    size: u32,
    capa: u16,
    settled: bool,
}

impl Default for Container {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Container {
    /// Container without storage
    pub const EMPTY: Container = Container {
        block: Handle::NONE,
        size: 0,
        capa: 0,
        settled: false,
    };

    /// Container over `block` with room for `capacity` elements; the block of
    /// a big container must already carry its header.
    pub(crate) fn with_block(block: Handle, size: u32, capacity: u32) -> Self {
        debug_assert!(size <= capacity);
        let capa = if is_big_capacity(capacity) {
            BIG_CAPACITY_MARKER
        } else {
            capacity as u16
        };
        Self {
            block,
            size,
            capa,
            settled: false,
        }
    }

    pub(crate) fn from_raw(block: Handle, size: u32, capa: u16) -> Self {
        Self {
            block,
            size,
            capa,
            settled: false,
        }
    }

    /// Same container, with the generic-array mark set to `settled`
    pub(crate) fn with_settled(self, settled: bool) -> Self {
        Self { settled, ..self }
    }

    /// Whether a plain array has already held a non-specialized element.
    /// Such an array never specializes again, even once emptied and shrunk.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Block holding the elements (and the header, for big containers)
    #[inline]
    pub fn block(&self) -> Handle {
        self.block
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> u32 {
        self.size
    }

    /// Whether the container holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the capacity lives in the block header
    #[inline]
    pub fn is_big(&self) -> bool {
        self.capa == BIG_CAPACITY_MARKER
    }

    pub(crate) fn inline_capacity(&self) -> u16 {
        self.capa
    }

    pub(crate) fn set_len(&mut self, size: u32) {
        self.size = size;
    }

    /// Element capacity
    pub fn capacity<B: Backend>(&self, arena: &PoolAllocator<B>) -> u32 {
        if self.is_big() {
            read_u32(arena.bytes(self.block, 4), 0)
        } else {
            self.capa as u32
        }
    }

    /// Handle of the first element
    #[inline]
    pub fn data(&self) -> Handle {
        if self.is_big() {
            self.block.add(BIG_HEADER_SIZE)
        } else {
            self.block
        }
    }

    /// Handle of element `index`
    #[inline]
    pub fn element(&self, elem: Elem, index: u32) -> Handle {
        self.data().add(index as usize * elem.width())
    }

    /// Bytes reserved by the element block
    pub fn mem_size<B: Backend>(&self, elem: Elem, arena: &PoolAllocator<B>) -> usize {
        if self.block.is_none() {
            return 0;
        }
        elem.block_size(self.capacity(arena))
    }

    /// Bytes of the element block in use
    pub fn mem_used(&self, elem: Elem) -> usize {
        let data = self.size as usize * elem.width();
        if self.is_big() {
            BIG_HEADER_SIZE + data
        } else {
            data
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapBackend;
    use crate::config::ArenaConfig;

    #[test]
    fn test_elem_widths() {
        assert_eq!(Elem::Value.width(), 16);
        assert_eq!(Elem::Member.width(), 24);
        assert_eq!(Elem::Bool.width(), 1);
        assert_eq!(Elem::Int.width(), 8);
        assert_eq!(Elem::Double.width(), 8);
    }

    #[test]
    fn test_block_size_switches_at_limit() {
        assert_eq!(Elem::Int.block_size(65_534), 65_534 * 8);
        assert_eq!(Elem::Int.block_size(65_535), BIG_HEADER_SIZE + 65_535 * 8);
        assert!(!is_big_capacity(65_534));
        assert!(is_big_capacity(65_535));
    }

    #[test]
    fn test_small_container_capacity() {
        let arena = PoolAllocator::<HeapBackend>::default();
        let c = Container::with_block(Handle::NONE, 3, 10);
        assert!(!c.is_big());
        assert_eq!(c.capacity(&arena), 10);
        assert_eq!(c.data(), c.block());
        assert_eq!(c.mem_used(Elem::Value), 48);
    }

    #[test]
    fn test_big_container_reads_header() {
        let mut arena = PoolAllocator::compacting(HeapBackend::new(), ArenaConfig::default());
        let block = arena.commit_big(70_000, &[0u8; 16]).unwrap();
        let c = Container::with_block(block, 2, 70_000);
        assert!(c.is_big());
        assert_eq!(c.capacity(&arena), 70_000);
        assert_eq!(c.data(), block.add(BIG_HEADER_SIZE));
        assert_eq!(c.element(Elem::Int, 1), block.add(BIG_HEADER_SIZE + 8));
        assert_eq!(c.mem_used(Elem::Int), BIG_HEADER_SIZE + 16);
    }

    #[test]
    fn test_settled_mark_survives_copies() {
        let c = Container::EMPTY.with_settled(true);
        assert!(c.is_settled());
        assert!(c.is_empty());
        assert!(!Container::EMPTY.is_settled());
        assert!(!Container::with_block(Handle::NONE, 0, 4).is_settled());
    }

    #[test]
    fn test_empty_container() {
        let arena = PoolAllocator::<HeapBackend>::default();
        let c = Container::EMPTY;
        assert!(c.is_empty());
        assert_eq!(c.capacity(&arena), 0);
        assert_eq!(c.mem_size(Elem::Member, &arena), 0);
    }
}
