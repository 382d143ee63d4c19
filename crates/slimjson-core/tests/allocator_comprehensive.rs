//! Comprehensive tests for the pool allocator
//!
//! Covers:
//! - Bump allocation and dead-cell reuse
//! - Fallback blocks and disabled chunking
//! - Empty-chunk reset, clear and shrink in both addressing modes
//! - Dead-cell packing and the sanity pass
//! - Bounded backend exhaustion and shared accounting

use slimjson::{
    Addressing, ArenaConfig, Backend, BoundedBackend, Error, Handle, HeapBackend, PoolAllocator,
};

fn small_arena(backend: HeapBackend) -> PoolAllocator<HeapBackend> {
    PoolAllocator::compacting(backend, ArenaConfig::with_chunk_size(64))
}

// === Allocation ===

#[test]
fn test_zero_size_returns_none() {
    let mut arena = PoolAllocator::default();
    let handle = arena.allocate(0).unwrap();
    assert!(handle.is_none());
    arena.deallocate(handle, 0);
    assert_eq!(arena.chunk_count(), 0);
}

#[test]
fn test_sizes_are_rounded_to_cells() {
    let mut arena = small_arena(HeapBackend::new());
    let a = arena.allocate(3).unwrap();
    let b = arena.allocate(9).unwrap();
    assert_eq!(a.offset(), 0);
    assert_eq!(b.offset(), 8);
    assert_eq!(arena.allocated_bytes(), 24);
    assert_eq!(arena.direct_available(), 40);
}

#[test]
fn test_dead_cell_reused_before_new_chunk() {
    let mut arena = small_arena(HeapBackend::new());
    let blocks: Vec<Handle> = (0..4).map(|_| arena.allocate(16).unwrap()).collect();
    assert_eq!(arena.direct_available(), 0);

    arena.deallocate(blocks[1], 16);
    assert_eq!(arena.dead_cell_count(), 1);
    assert_eq!(arena.dead_bytes(), 16);

    let reused = arena.allocate(16).unwrap();
    assert_eq!(reused, blocks[1]);
    assert_eq!(arena.chunk_count(), 1);
    assert_eq!(arena.dead_bytes(), 0);
}

#[test]
fn test_new_chunk_when_full() {
    let mut arena = small_arena(HeapBackend::new());
    for _ in 0..4 {
        arena.allocate(16).unwrap();
    }
    let next = arena.allocate(16).unwrap();
    assert_eq!(next.chunk_index(), Some(1));
    assert_eq!(arena.chunk_count(), 2);
}

#[test]
fn test_tail_release_returns_to_bump_region() {
    let mut arena = small_arena(HeapBackend::new());
    let _a = arena.allocate(16).unwrap();
    let b = arena.allocate(16).unwrap();
    arena.deallocate(b, 16);
    assert_eq!(arena.dead_cell_count(), 0);
    assert_eq!(arena.direct_available(), 48);
}

#[test]
fn test_fragmentation_ratio() {
    let mut arena = small_arena(HeapBackend::new());
    let a = arena.allocate(16).unwrap();
    let b = arena.allocate(16).unwrap();
    let _c = arena.allocate(16).unwrap();
    arena.deallocate(a, 16);
    arena.deallocate(b, 16);
    assert_eq!(arena.dead_bytes(), 32);
    let stats = arena.stats();
    assert_eq!(stats.allocated_bytes, 16);
    assert!(stats.fragmentation_ratio() > 0.5);
}

#[test]
fn test_all_released_chunk_is_empty() {
    let mut arena = small_arena(HeapBackend::new());
    let a = arena.allocate(16).unwrap();
    let b = arena.allocate(16).unwrap();
    arena.deallocate(a, 16);
    arena.deallocate(b, 16);
    assert_eq!(arena.allocated_bytes(), 0);
    assert_eq!(arena.dead_cell_count(), 0);
    assert_eq!(arena.direct_available(), 64);
}

#[test]
fn test_realloc_in_place_at_tail() {
    let mut arena = small_arena(HeapBackend::new());
    let _a = arena.allocate(8).unwrap();
    let b = arena.allocate(8).unwrap();
    assert!(arena.realloc_in_place(b, 8, 32));
    assert_eq!(arena.direct_available(), 24);
    assert!(!arena.realloc_in_place(b, 32, 128));
    assert!(arena.realloc_in_place(b, 32, 8));
    assert_eq!(arena.direct_available(), 48);
}

#[test]
fn test_commit_copies_bytes() {
    let mut arena = PoolAllocator::default();
    let handle = arena.commit(&[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(arena.bytes(handle, 5), &[1, 2, 3, 4, 5]);

    let big = arena.commit_big(70_000, &[9; 16]).unwrap();
    assert_eq!(&arena.bytes(big, 4)[..], &70_000u32.to_le_bytes());
    assert_eq!(arena.bytes(big.add(8), 16), &[9; 16]);
}

#[test]
fn test_copy_within_block_overlapping() {
    let mut arena = PoolAllocator::default();
    let handle = arena.commit(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    arena.copy(handle, handle.add(2), 4);
    assert_eq!(arena.bytes(handle, 8), &[1, 2, 1, 2, 3, 4, 7, 8]);
}

// === Fallback blocks ===

#[test]
fn test_large_request_becomes_fallback() {
    let backend = HeapBackend::new();
    let mut arena = small_arena(backend.clone());
    let handle = arena.allocate(100).unwrap();
    assert!(handle.is_fallback());
    assert_eq!(arena.fallback_count(), 1);
    assert_eq!(arena.chunk_count(), 0);
    assert_eq!(backend.allocated(), 104);

    arena.deallocate(handle, 100);
    assert_eq!(arena.fallback_count(), 0);
    assert_eq!(backend.allocated(), 0);
}

#[test]
fn test_fallback_slots_are_reused() {
    let mut arena = small_arena(HeapBackend::new());
    let first = arena.allocate(128).unwrap();
    arena.deallocate(first, 128);
    let second = arena.allocate(256).unwrap();
    assert_eq!(second.fallback_index(), first.fallback_index());
}

#[test]
fn test_zero_chunk_size_disables_chunking() {
    let mut arena = PoolAllocator::compacting(HeapBackend::new(), ArenaConfig::with_chunk_size(0));
    let handle = arena.allocate(8).unwrap();
    assert!(handle.is_fallback());
    assert!(!arena.is_chunkable(8));
    assert_eq!(arena.chunk_count(), 0);
}

// === Clear and shrink ===

#[test]
fn test_clear_keeps_chunks_until_shrink() {
    let backend = HeapBackend::new();
    let mut arena = small_arena(backend.clone());
    for _ in 0..6 {
        arena.allocate(16).unwrap();
    }
    arena.allocate(200).unwrap();
    assert_eq!(arena.chunk_count(), 2);

    arena.clear();
    assert_eq!(arena.allocated_bytes(), 0);
    assert_eq!(arena.fallback_count(), 0);
    assert_eq!(arena.chunk_count(), 2);
    assert_eq!(backend.allocated(), 128);

    arena.shrink();
    assert_eq!(arena.chunk_count(), 0);
    assert_eq!(backend.allocated(), 0);
}

#[test]
fn test_compacting_shrink_releases_only_empty_chunks() {
    let backend = HeapBackend::new();
    let mut arena = small_arena(backend.clone());
    let first: Vec<Handle> = (0..4).map(|_| arena.allocate(16).unwrap()).collect();
    let kept = arena.allocate(16).unwrap();
    for handle in first {
        arena.deallocate(handle, 16);
    }
    arena.shrink();
    assert_eq!(arena.chunk_count(), 1);
    assert_eq!(backend.allocated(), 64);
    assert_eq!(arena.bytes(kept, 16).len(), 16);

    let reused = arena.allocate(64).unwrap();
    assert_eq!(reused.chunk_index(), Some(0));
}

#[test]
fn test_stable_shrink_is_all_or_nothing() {
    let backend = HeapBackend::new();
    let mut arena = PoolAllocator::stable(backend.clone(), ArenaConfig::with_chunk_size(64));
    assert_eq!(arena.addressing(), Addressing::Stable);
    let first: Vec<Handle> = (0..4).map(|_| arena.allocate(16).unwrap()).collect();
    let last = arena.allocate(16).unwrap();
    for handle in first {
        arena.deallocate(handle, 16);
    }
    arena.shrink();
    assert_eq!(arena.chunk_count(), 2);

    arena.deallocate(last, 16);
    arena.shrink();
    assert_eq!(arena.chunk_count(), 0);
    assert_eq!(backend.allocated(), 0);
}

#[test]
fn test_release_all_returns_everything() {
    let backend = HeapBackend::new();
    let mut arena = small_arena(backend.clone());
    arena.allocate(16).unwrap();
    arena.allocate(1000).unwrap();
    arena.release_all();
    assert_eq!(backend.allocated(), 0);
    assert_eq!(backend.live_blocks(), 0);
    assert_eq!(arena.chunk_capacity(), 0);
}

// === Packing and verification ===

#[test]
fn test_pack_coalesces_neighbors() {
    let mut arena = small_arena(HeapBackend::new());
    let blocks: Vec<Handle> = (0..4).map(|_| arena.allocate(16).unwrap()).collect();
    arena.deallocate(blocks[0], 16);
    arena.deallocate(blocks[1], 16);
    assert_eq!(arena.dead_cell_count(), 2);

    assert_eq!(arena.pack(), 0);
    assert_eq!(arena.dead_cell_count(), 1);
    assert_eq!(arena.dead_bytes(), 32);
    arena.verify().unwrap();

    let merged = arena.allocate(32).unwrap();
    assert_eq!(merged, blocks[0]);
}

#[test]
fn test_pack_returns_trailing_run_to_bump() {
    let mut arena = small_arena(HeapBackend::new());
    let blocks: Vec<Handle> = (0..4).map(|_| arena.allocate(16).unwrap()).collect();
    arena.deallocate(blocks[2], 16);
    arena.deallocate(blocks[3], 16);
    assert_eq!(arena.direct_available(), 16);
    assert_eq!(arena.dead_bytes(), 16);

    assert_eq!(arena.pack(), 16);
    assert_eq!(arena.direct_available(), 32);
    assert_eq!(arena.dead_bytes(), 0);
    assert_eq!(arena.dead_cell_count(), 0);
    arena.verify().unwrap();
}

#[test]
fn test_verify_mode_runs_after_release() {
    let config = ArenaConfig {
        chunk_size: 128,
        pack_dead_cells: true,
        verify: true,
    };
    let mut arena = PoolAllocator::compacting(HeapBackend::new(), config);
    let handles: Vec<Handle> = (0..8).map(|i| arena.allocate(8 + i * 8).unwrap()).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        arena.deallocate(handle, 8 + i * 8);
    }
    arena.verify().unwrap();
    assert_eq!(arena.allocated_bytes(), 0);
}

// === Backends ===

#[test]
fn test_bounded_backend_exhaustion() {
    let backend = BoundedBackend::new(64);
    let mut arena = PoolAllocator::compacting(backend.clone(), ArenaConfig::with_chunk_size(64));
    arena.allocate(64).unwrap();
    let err = arena.allocate(8).unwrap_err();
    assert!(err.is_exhaustion());
    assert_eq!(err, Error::exhausted(64, 0));
    assert_eq!(arena.chunk_count(), 1);
    assert_eq!(backend.used(), 64);
}

#[test]
fn test_bounded_backend_frees_budget() {
    let backend = BoundedBackend::new(256);
    let block = backend.allocate(200).unwrap();
    assert!(backend.allocate(100).is_err());
    backend.deallocate(block);
    assert_eq!(backend.available(), 256);
    assert!(backend.allocate(100).is_ok());
}

#[test]
fn test_heap_backend_clones_share_counters() {
    let backend = HeapBackend::new();
    let clone = backend.clone();
    let block = clone.allocate(32).unwrap();
    assert_eq!(backend.allocated(), 32);
    assert_eq!(backend.peak(), 32);
    assert_eq!(backend.live_blocks(), 1);
    backend.deallocate(block);
    assert_eq!(clone.allocated(), 0);
    assert_eq!(clone.peak(), 32);
    assert_eq!(clone.total_allocations(), 1);
}
