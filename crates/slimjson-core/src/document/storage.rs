//! Container block management: growth, shrink, conversion and release
//!
//! Every function takes a container header by value and returns the updated
//! header; the caller stores it back into the owning cell. On error the old
//! block is untouched.

use crate::alloc::{Backend, Handle, PoolAllocator, write_u32};
use crate::config::limits::{
    BIG_HEADER_SIZE, CONTAINER_GROWTH, SMALL_CAPACITY_LIMIT, VALUE_SIZE, align_cell, grown,
};
use crate::error::Result;
use crate::value::{self, Container, Elem, Value, is_big_capacity};
use smallvec::SmallVec;
use tracing::trace;

/// Capacity to grow to when `needed` elements must fit.
///
/// While `needed` is still small the target stays below the big-layout
/// threshold, so the switch happens exactly when the size reaches it.
pub(crate) fn grow_target(capacity: u32, needed: u32) -> u32 {
    let grown = grown(capacity as usize, CONTAINER_GROWTH).min(u32::MAX as usize) as u32;
    let target = grown.max(needed);
    if needed < SMALL_CAPACITY_LIMIT && target >= SMALL_CAPACITY_LIMIT {
        SMALL_CAPACITY_LIMIT - 1
    } else {
        target
    }
}

/// Reallocate `c` to exactly `capacity` elements (at least its size)
pub(crate) fn resize<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    elem: Elem,
    capacity: u32,
) -> Result<Container> {
    debug_assert!(capacity >= c.len());
    let old_bytes = c.mem_size(elem, arena);
    let used = c.len() as usize * elem.width();
    let new_bytes = elem.block_size(capacity);

    if !is_big_capacity(capacity) {
        if !c.is_big()
            && !c.block().is_none()
            && arena.realloc_in_place(c.block(), old_bytes, new_bytes)
        {
            return Ok(
                Container::with_block(c.block(), c.len(), capacity).with_settled(c.is_settled())
            );
        }
        let block = arena.allocate(new_bytes)?;
        arena.copy(c.data(), block, used);
        arena.deallocate(c.block(), old_bytes);
        return Ok(Container::with_block(block, c.len(), capacity).with_settled(c.is_settled()));
    }

    let block = arena.allocate(new_bytes)?;
    write_u32(arena.bytes_mut(block, 4), 0, capacity);
    arena.copy(c.data(), block.add(BIG_HEADER_SIZE), used);
    arena.deallocate(c.block(), old_bytes);
    if !c.is_big() {
        trace!(capacity, "container promoted to big layout");
    }
    Ok(Container::with_block(block, c.len(), capacity).with_settled(c.is_settled()))
}

/// Make room for at least `capacity` elements in one step
pub(crate) fn reserve<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    elem: Elem,
    capacity: u32,
) -> Result<Container> {
    if capacity <= c.capacity(arena) {
        return Ok(c);
    }
    resize(arena, c, elem, capacity)
}

/// Make room for one more element, growing geometrically
pub(crate) fn grow_for_push<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    elem: Elem,
) -> Result<Container> {
    let capacity = c.capacity(arena);
    if c.len() < capacity {
        return Ok(c);
    }
    resize(arena, c, elem, grow_target(capacity, c.len() + 1))
}

/// Fit the block to the current size, demoting big containers that have
/// dropped under the threshold
pub(crate) fn shrink_to_fit<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    elem: Elem,
) -> Result<Container> {
    let capacity = c.capacity(arena);
    let size = c.len();
    if size == capacity {
        return Ok(c);
    }
    if size == 0 {
        arena.deallocate(c.block(), c.mem_size(elem, arena));
        return Ok(Container::EMPTY.with_settled(c.is_settled()));
    }
    if !c.is_big() && c.block().chunk_index().is_some() {
        let used = align_cell(size as usize * elem.width());
        let total = align_cell(capacity as usize * elem.width());
        if total > used {
            arena.deallocate(c.block().add(used), total - used);
        }
        return Ok(
            Container::with_block(c.block(), size, size).with_settled(c.is_settled())
        );
    }
    resize(arena, c, elem, size)
}

/// Rewrite a bool, int or double array as full value cells with room for
/// `extra` more elements
pub(crate) fn widen<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    from: Elem,
    extra: u32,
) -> Result<Container> {
    let size = c.len();
    let capacity = c.capacity(arena).max(size + extra);
    let bytes = Elem::Value.block_size(capacity);
    let block = arena.allocate(bytes)?;
    let data = if is_big_capacity(capacity) {
        write_u32(arena.bytes_mut(block, 4), 0, capacity);
        block.add(BIG_HEADER_SIZE)
    } else {
        block
    };

    let width = from.width();
    for i in 0..size {
        let scalar = value::raw_scalar(from, arena.bytes(c.element(from, i), width));
        arena
            .bytes_mut(data.add(i as usize * VALUE_SIZE), VALUE_SIZE)
            .copy_from_slice(&scalar.encode());
    }
    let old_bytes = c.mem_size(from, arena);
    arena.deallocate(c.block(), old_bytes);
    trace!(size, ?from, "specialized array demoted");
    Ok(Container::with_block(block, size, capacity).with_settled(true))
}

/// Re-lay the block of an empty container for another element width,
/// keeping its capacity
pub(crate) fn relayout<B: Backend>(
    arena: &mut PoolAllocator<B>,
    c: Container,
    from: Elem,
    to: Elem,
) -> Result<Container> {
    debug_assert!(c.is_empty());
    let capacity = c.capacity(arena);
    let old_bytes = c.mem_size(from, arena);
    let block = arena.allocate(to.block_size(capacity))?;
    if is_big_capacity(capacity) {
        write_u32(arena.bytes_mut(block, 4), 0, capacity);
    }
    arena.deallocate(c.block(), old_bytes);
    Ok(Container::with_block(block, 0, capacity))
}

/// Convert an int array's payloads to doubles without moving it
pub(crate) fn ints_to_doubles<B: Backend>(arena: &mut PoolAllocator<B>, c: Container) {
    if c.is_empty() {
        return;
    }
    let len = c.len() as usize;
    value::ints_to_doubles(arena.bytes_mut(c.data(), len * 8), len);
}

/// Cells of the direct children of a generic array or object
pub(crate) fn child_slots(value: &Value) -> SmallVec<[Handle; 8]> {
    let (Some(c), Some(elem)) = (value.container(), value.kind().element()) else {
        return SmallVec::new();
    };
    match elem {
        Elem::Value => (0..c.len()).map(|i| c.element(elem, i)).collect(),
        Elem::Member => (0..c.len()).map(|i| c.element(elem, i).add(8)).collect(),
        Elem::Bool | Elem::Int | Elem::Double => SmallVec::new(),
    }
}

/// Free `value`'s storage and every container below it.
///
/// Children are read before their parent block is freed. Strings stay in
/// the pool.
pub(crate) fn release<B: Backend>(arena: &mut PoolAllocator<B>, value: Value) {
    let mut pending: SmallVec<[Value; 16]> = SmallVec::new();
    pending.push(value);
    while let Some(value) = pending.pop() {
        let (Some(c), Some(elem)) = (value.container(), value.kind().element()) else {
            continue;
        };
        if c.block().is_none() {
            continue;
        }
        if matches!(elem, Elem::Value | Elem::Member) {
            for slot in child_slots(&value) {
                let child = Value::decode(arena.bytes(slot, VALUE_SIZE));
                if child.container().is_some_and(|c| !c.block().is_none()) {
                    pending.push(child);
                }
            }
        }
        let bytes = c.mem_size(elem, arena);
        arena.deallocate(c.block(), bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapBackend;
    use crate::config::ArenaConfig;

    fn arena() -> PoolAllocator<HeapBackend> {
        PoolAllocator::compacting(HeapBackend::new(), ArenaConfig::default())
    }

    fn push_ints(arena: &mut PoolAllocator<HeapBackend>, mut c: Container, n: i64) -> Container {
        for v in 0..n {
            c = grow_for_push(arena, c, Elem::Int).unwrap();
            let slot = c.element(Elem::Int, c.len());
            arena.bytes_mut(slot, 8).copy_from_slice(&v.to_le_bytes());
            c.set_len(c.len() + 1);
        }
        c
    }

    #[test]
    fn test_grow_target_sequence() {
        assert_eq!(grow_target(0, 1), 1);
        assert_eq!(grow_target(1, 2), 2);
        assert_eq!(grow_target(2, 3), 3);
        assert_eq!(grow_target(3, 4), 5);
        assert_eq!(grow_target(50_000, 50_001), 65_534);
        assert_eq!(grow_target(65_534, 65_535), 98_301);
        assert_eq!(grow_target(4, 100), 100);
    }

    #[test]
    fn test_growth_keeps_contents() {
        let mut arena = arena();
        let c = push_ints(&mut arena, Container::EMPTY, 100);
        assert_eq!(c.len(), 100);
        assert!(c.capacity(&arena) >= 100);
        for i in 0..100u32 {
            assert_eq!(
                value::raw_scalar(Elem::Int, arena.bytes(c.element(Elem::Int, i), 8)),
                Value::Int64(i64::from(i))
            );
        }
    }

    #[test]
    fn test_shrink_releases_tail() {
        let mut arena = arena();
        let c = reserve(&mut arena, Container::EMPTY, Elem::Value, 10).unwrap();
        let mut c = c;
        c.set_len(3);
        let _other = arena.allocate(16).unwrap();
        let before = arena.allocated_bytes();
        let c = shrink_to_fit(&mut arena, c, Elem::Value).unwrap();
        assert_eq!(c.capacity(&arena), 3);
        assert_eq!(arena.allocated_bytes(), before - 7 * VALUE_SIZE);
        let again = shrink_to_fit(&mut arena, c, Elem::Value).unwrap();
        assert_eq!(again, c);
    }

    #[test]
    fn test_shrink_empty_frees_block() {
        let mut arena = arena();
        let c = reserve(&mut arena, Container::EMPTY, Elem::Member, 4).unwrap();
        let c = shrink_to_fit(&mut arena, c, Elem::Member).unwrap();
        assert_eq!(c, Container::EMPTY);
        assert_eq!(arena.allocated_bytes(), 0);
    }

    #[test]
    fn test_settled_mark_survives_resize_and_shrink() {
        let mut arena = arena();
        let c = reserve(&mut arena, Container::EMPTY.with_settled(true), Elem::Value, 4).unwrap();
        assert!(c.is_settled());
        let c = grow_for_push(&mut arena, c, Elem::Value).unwrap();
        assert!(c.is_settled());
        let c = shrink_to_fit(&mut arena, c, Elem::Value).unwrap();
        assert!(c.block().is_none());
        assert!(c.is_settled());
        assert_eq!(arena.allocated_bytes(), 0);
    }

    #[test]
    fn test_relayout_keeps_capacity() {
        let mut arena = arena();
        let c = reserve(&mut arena, Container::EMPTY, Elem::Value, 8).unwrap();
        assert_eq!(arena.allocated_bytes(), 8 * VALUE_SIZE);
        let c = relayout(&mut arena, c, Elem::Value, Elem::Int).unwrap();
        assert_eq!(c.capacity(&arena), 8);
        assert_eq!(arena.allocated_bytes(), 8 * 8);
        let c = relayout(&mut arena, c, Elem::Int, Elem::Bool).unwrap();
        assert_eq!(c.mem_size(Elem::Bool, &arena), 8);
        assert_eq!(arena.allocated_bytes(), 8);
    }

    #[test]
    fn test_big_promotion_and_demotion() {
        let mut arena = arena();
        let mut c = push_ints(&mut arena, Container::EMPTY, 65_534);
        assert!(!c.is_big());
        assert_eq!(c.capacity(&arena), 65_534);

        c = push_ints(&mut arena, c, 1);
        assert!(c.is_big());
        assert_eq!(c.len(), 65_535);

        c.set_len(10);
        let c = shrink_to_fit(&mut arena, c, Elem::Int).unwrap();
        assert!(!c.is_big());
        assert_eq!(c.capacity(&arena), 10);
        assert_eq!(
            value::raw_scalar(Elem::Int, arena.bytes(c.element(Elem::Int, 9), 8)),
            Value::Int64(9)
        );
    }

    #[test]
    fn test_widen_ints() {
        let mut arena = arena();
        let c = push_ints(&mut arena, Container::EMPTY, 5);
        let c = widen(&mut arena, c, Elem::Int, 1).unwrap();
        assert_eq!(c.len(), 5);
        assert!(c.capacity(&arena) >= 6);
        let third = Value::decode(arena.bytes(c.element(Elem::Value, 3), VALUE_SIZE));
        assert_eq!(third, Value::Int64(3));
    }

    #[test]
    fn test_release_nested() {
        let backend = HeapBackend::new();
        let mut arena = PoolAllocator::compacting(backend.clone(), ArenaConfig::default());
        let inner = push_ints(&mut arena, Container::EMPTY, 3);
        let mut outer = reserve(&mut arena, Container::EMPTY, Elem::Value, 2).unwrap();
        let cell = Value::IntArray(inner).encode();
        arena
            .bytes_mut(outer.element(Elem::Value, 0), VALUE_SIZE)
            .copy_from_slice(&cell);
        outer.set_len(1);

        release(&mut arena, Value::Array(outer));
        assert_eq!(arena.allocated_bytes(), 0);
    }
}
