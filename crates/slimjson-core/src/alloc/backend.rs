//! Memory backends feeding the pool allocator
//!
//! A backend hands out whole chunks and fallback blocks. Clones of a backend
//! share their accounting, so a document and the string pool it owns can
//! report combined usage through one value.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::rc::Rc;

/// Source of chunk and fallback memory
pub trait Backend: Clone {
    /// Allocate a zeroed block of exactly `size` bytes
    fn allocate(&self, size: usize) -> Result<Box<[u8]>>;

    /// Return a block obtained from [`Backend::allocate`]
    fn deallocate(&self, block: Box<[u8]>);
}

#[derive(Debug, Default)]
struct HeapCounters {
    allocated: Cell<usize>,
    peak: Cell<usize>,
    live_blocks: Cell<usize>,
    total_allocations: Cell<u64>,
}

/// Global-heap backend with allocation accounting
///
/// Heap exhaustion is not recoverable here: it aborts like any other Rust
/// allocation failure.
#[derive(Debug, Clone, Default)]
pub struct HeapBackend {
    counters: Rc<HeapCounters>,
}

impl HeapBackend {
    /// Create a backend with fresh counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently allocated through this backend and its clones
    pub fn allocated(&self) -> usize {
        self.counters.allocated.get()
    }

    /// Highest value [`HeapBackend::allocated`] has reached
    pub fn peak(&self) -> usize {
        self.counters.peak.get()
    }

    /// Blocks currently live
    pub fn live_blocks(&self) -> usize {
        self.counters.live_blocks.get()
    }

    /// Allocation calls served since creation
    pub fn total_allocations(&self) -> u64 {
        self.counters.total_allocations.get()
    }
}

impl Backend for HeapBackend {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        let block = vec![0u8; size].into_boxed_slice();
        let counters = &self.counters;
        let allocated = counters.allocated.get() + size;
        counters.allocated.set(allocated);
        counters.peak.set(counters.peak.get().max(allocated));
        counters.live_blocks.set(counters.live_blocks.get() + 1);
        counters
            .total_allocations
            .set(counters.total_allocations.get() + 1);
        Ok(block)
    }

    fn deallocate(&self, block: Box<[u8]>) {
        let counters = &self.counters;
        counters
            .allocated
            .set(counters.allocated.get().saturating_sub(block.len()));
        counters
            .live_blocks
            .set(counters.live_blocks.get().saturating_sub(1));
    }
}

/// Backend with a fixed byte budget
///
/// Requests past the budget fail with [`Error::Exhausted`] instead of
/// touching the heap; the caller's operation is abandoned before any state
/// changes.
#[derive(Debug, Clone)]
pub struct BoundedBackend {
    capacity: usize,
    used: Rc<Cell<usize>>,
}

impl BoundedBackend {
    /// Create a backend that never holds more than `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: Rc::new(Cell::new(0)),
        }
    }

    /// Total budget in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently handed out
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Bytes still available
    pub fn available(&self) -> usize {
        self.capacity - self.used.get()
    }
}

impl Backend for BoundedBackend {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        let available = self.available();
        if size > available {
            return Err(Error::exhausted(size, available));
        }
        self.used.set(self.used.get() + size);
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn deallocate(&self, block: Box<[u8]>) {
        self.used.set(self.used.get().saturating_sub(block.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_backend_accounting() {
        let backend = HeapBackend::new();
        let a = backend.allocate(64).unwrap();
        let b = backend.allocate(32).unwrap();
        assert_eq!(backend.allocated(), 96);
        assert_eq!(backend.live_blocks(), 2);

        backend.deallocate(a);
        assert_eq!(backend.allocated(), 32);
        assert_eq!(backend.peak(), 96);

        backend.deallocate(b);
        assert_eq!(backend.allocated(), 0);
        assert_eq!(backend.live_blocks(), 0);
        assert_eq!(backend.total_allocations(), 2);
    }

    #[test]
    fn test_heap_backend_clones_share_counters() {
        let backend = HeapBackend::new();
        let clone = backend.clone();
        let block = clone.allocate(128).unwrap();
        assert_eq!(backend.allocated(), 128);
        backend.deallocate(block);
        assert_eq!(clone.allocated(), 0);
    }

    #[test]
    fn test_bounded_backend_exhaustion() {
        let backend = BoundedBackend::new(100);
        let block = backend.allocate(64).unwrap();
        assert_eq!(backend.available(), 36);

        let err = backend.allocate(64).unwrap_err();
        assert_eq!(err, Error::exhausted(64, 36));
        assert_eq!(backend.used(), 64);

        backend.deallocate(block);
        assert!(backend.allocate(100).is_ok());
    }

    #[test]
    fn test_allocated_blocks_are_zeroed() {
        let backend = HeapBackend::new();
        let block = backend.allocate(16).unwrap();
        assert!(block.iter().all(|&b| b == 0));
        backend.deallocate(block);
    }
}
