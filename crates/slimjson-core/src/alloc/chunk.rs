//! A single arena chunk: bump region plus an intrusive dead-cell list
//!
//! Freed ranges below the bump pointer become dead cells. Each dead cell
//! stores its own size and the offset of the next dead cell in its first
//! eight bytes, so the free list costs no memory outside the chunk.

use super::{read_u32, write_u32};
use crate::config::limits::{CELL_ALIGNMENT, DEAD_CELL_SIZE};
use smallvec::SmallVec;

/// End-of-list marker for dead-cell links
pub(crate) const NO_CELL: u32 = u32::MAX;

/// Outcome of returning a range to a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Range became a dead cell
    Dead,
    /// Range was at the bump pointer, which moved back
    Tail,
    /// No live bytes remain; the chunk was reset
    Emptied,
}

#[derive(Debug, Default)]
pub(crate) struct Chunk {
    data: Box<[u8]>,
    first_avail: u32,
    first_dead: u32,
    total_dead: u32,
}

impl Chunk {
    pub(crate) fn new(data: Box<[u8]>) -> Self {
        Self {
            data,
            first_avail: 0,
            first_dead: NO_CELL,
            total_dead: 0,
        }
    }

    /// A chunk whose buffer went back to the backend
    pub(crate) fn is_vacant(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn take_data(&mut self) -> Box<[u8]> {
        self.reset();
        std::mem::take(&mut self.data)
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    pub(crate) fn first_avail(&self) -> u32 {
        self.first_avail
    }

    pub(crate) fn total_dead(&self) -> u32 {
        self.total_dead
    }

    pub(crate) fn live_bytes(&self) -> u32 {
        self.first_avail - self.total_dead
    }

    pub(crate) fn direct_available(&self) -> u32 {
        self.capacity() - self.first_avail
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live_bytes() == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.direct_available() == 0 && self.total_dead == 0
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn reset(&mut self) {
        self.first_avail = 0;
        self.first_dead = NO_CELL;
        self.total_dead = 0;
    }

    /// Take `size` bytes from the bump region
    pub(crate) fn bump(&mut self, size: u32) -> Option<u32> {
        if size > self.direct_available() {
            return None;
        }
        let pos = self.first_avail;
        self.first_avail += size;
        Some(pos)
    }

    /// Take `size` bytes from the dead-cell list.
    ///
    /// Exact fits are unlinked. A cell at least twice the request is split
    /// immediately. Otherwise the smallest larger cell is split.
    pub(crate) fn take_dead(&mut self, size: u32) -> Option<u32> {
        if self.total_dead < size {
            return None;
        }

        let mut prev = NO_CELL;
        let mut cur = self.first_dead;
        let mut best: Option<(u32, u32, u32)> = None;
        while cur != NO_CELL {
            let (cell_size, next) = self.cell(cur);
            if cell_size == size {
                self.unlink(prev, next);
                self.total_dead -= size;
                return Some(cur);
            }
            if cell_size >= 2 * size {
                return Some(self.split(cur, cell_size, next, size));
            }
            if cell_size > size && best.is_none_or(|(_, best_size, _)| cell_size < best_size) {
                best = Some((cur, cell_size, next));
            }
            prev = cur;
            cur = next;
        }

        best.map(|(pos, cell_size, next)| self.split(pos, cell_size, next, size))
    }

    /// Return `size` bytes at `pos`
    pub(crate) fn release(&mut self, pos: u32, size: u32) -> Release {
        debug_assert!(pos + size <= self.first_avail, "release past bump pointer");
        if self.total_dead + size == self.first_avail {
            self.reset();
            return Release::Emptied;
        }
        if pos + size == self.first_avail {
            self.first_avail = pos;
            return Release::Tail;
        }
        let head = self.first_dead;
        self.write_cell(pos, size, head);
        self.first_dead = pos;
        self.total_dead += size;
        Release::Dead
    }

    /// Resize the block ending at the bump pointer without moving it
    pub(crate) fn realloc_in_place(&mut self, pos: u32, old_size: u32, new_size: u32) -> bool {
        if pos + old_size != self.first_avail || pos + new_size > self.capacity() {
            return false;
        }
        self.first_avail = pos + new_size;
        true
    }

    /// Coalesce adjacent dead cells; a dead run touching the bump pointer
    /// goes back to the bump region. Returns the bytes moved back.
    pub(crate) fn pack(&mut self) -> u32 {
        if self.first_dead == NO_CELL {
            return 0;
        }

        let mut cells: SmallVec<[(u32, u32); 16]> = self.dead_cells().collect();
        cells.sort_unstable_by_key(|&(pos, _)| pos);

        let mut merged: SmallVec<[(u32, u32); 16]> = SmallVec::new();
        for (pos, size) in cells {
            match merged.last_mut() {
                Some(last) if last.0 + last.1 == pos => last.1 += size,
                _ => merged.push((pos, size)),
            }
        }

        let mut reclaimed = 0;
        if let Some(&(pos, size)) = merged.last()
            && pos + size == self.first_avail
        {
            merged.pop();
            self.first_avail = pos;
            self.total_dead -= size;
            reclaimed = size;
        }

        self.first_dead = NO_CELL;
        for &(pos, size) in merged.iter().rev() {
            let head = self.first_dead;
            self.write_cell(pos, size, head);
            self.first_dead = pos;
        }
        reclaimed
    }

    /// Iterate `(offset, size)` over dead cells in list order
    pub(crate) fn dead_cells(&self) -> DeadCells<'_> {
        DeadCells {
            chunk: self,
            cur: self.first_dead,
        }
    }

    /// Check the free list against the chunk counters
    pub(crate) fn verify(&self) -> Result<(), String> {
        let max_cells = self.capacity() as usize / DEAD_CELL_SIZE + 1;
        let mut cells: SmallVec<[(u32, u32); 16]> = SmallVec::new();
        for (pos, size) in self.dead_cells() {
            if cells.len() > max_cells {
                return Err("dead-cell list has a cycle".to_string());
            }
            if (size as usize) < DEAD_CELL_SIZE || (pos as usize) % CELL_ALIGNMENT != 0 {
                return Err(format!("malformed dead cell at {pos} (size {size})"));
            }
            if pos + size > self.first_avail {
                return Err(format!("dead cell at {pos} crosses bump pointer"));
            }
            cells.push((pos, size));
        }

        cells.sort_unstable_by_key(|&(pos, _)| pos);
        if cells.windows(2).any(|w| w[0].0 + w[0].1 > w[1].0) {
            return Err("overlapping dead cells".to_string());
        }

        let sum: u32 = cells.iter().map(|&(_, size)| size).sum();
        if sum != self.total_dead {
            return Err(format!(
                "dead bytes {sum} disagree with counter {}",
                self.total_dead
            ));
        }
        Ok(())
    }

    fn cell(&self, pos: u32) -> (u32, u32) {
        let at = pos as usize;
        (read_u32(&self.data, at), read_u32(&self.data, at + 4))
    }

    fn write_cell(&mut self, pos: u32, size: u32, next: u32) {
        let at = pos as usize;
        write_u32(&mut self.data, at, size);
        write_u32(&mut self.data, at + 4, next);
    }

    fn unlink(&mut self, prev: u32, next: u32) {
        if prev == NO_CELL {
            self.first_dead = next;
        } else {
            let (prev_size, _) = self.cell(prev);
            self.write_cell(prev, prev_size, next);
        }
    }

    fn split(&mut self, pos: u32, cell_size: u32, next: u32, size: u32) -> u32 {
        let remaining = cell_size - size;
        self.write_cell(pos, remaining, next);
        self.total_dead -= size;
        pos + remaining
    }
}

pub(crate) struct DeadCells<'a> {
    chunk: &'a Chunk,
    cur: u32,
}

impl Iterator for DeadCells<'_> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == NO_CELL {
            return None;
        }
        let pos = self.cur;
        let (size, next) = self.chunk.cell(pos);
        self.cur = next;
        Some((pos, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(size: usize) -> Chunk {
        Chunk::new(vec![0u8; size].into_boxed_slice())
    }

    #[test]
    fn test_bump_until_full() {
        let mut c = chunk(64);
        assert_eq!(c.bump(32), Some(0));
        assert_eq!(c.bump(32), Some(32));
        assert_eq!(c.bump(8), None);
        assert!(c.is_full());
    }

    #[test]
    fn test_release_tail_and_reset() {
        let mut c = chunk(64);
        let a = c.bump(16).unwrap();
        let b = c.bump(16).unwrap();
        assert_eq!(c.release(b, 16), Release::Tail);
        assert_eq!(c.first_avail(), 16);
        assert_eq!(c.release(a, 16), Release::Emptied);
        assert_eq!(c.first_avail(), 0);
    }

    #[test]
    fn test_release_middle_creates_dead_cell() {
        let mut c = chunk(64);
        let a = c.bump(16).unwrap();
        let _b = c.bump(16).unwrap();
        assert_eq!(c.release(a, 16), Release::Dead);
        assert_eq!(c.total_dead(), 16);
        assert_eq!(c.dead_cells().collect::<Vec<_>>(), vec![(0, 16)]);
        assert!(c.verify().is_ok());
    }

    #[test]
    fn test_take_dead_exact_fit() {
        let mut c = chunk(64);
        let a = c.bump(16).unwrap();
        let _b = c.bump(16).unwrap();
        c.release(a, 16);
        assert_eq!(c.take_dead(16), Some(a));
        assert_eq!(c.total_dead(), 0);
        assert_eq!(c.dead_cells().count(), 0);
    }

    #[test]
    fn test_take_dead_splits_large_cell_from_tail() {
        let mut c = chunk(128);
        let a = c.bump(64).unwrap();
        let _b = c.bump(8).unwrap();
        c.release(a, 64);

        // 64 >= 2 * 24, so the tail of the cell is handed out
        assert_eq!(c.take_dead(24), Some(40));
        assert_eq!(c.dead_cells().collect::<Vec<_>>(), vec![(0, 40)]);
        assert_eq!(c.total_dead(), 40);
        assert!(c.verify().is_ok());
    }

    #[test]
    fn test_take_dead_prefers_smallest_adequate_cell() {
        let mut c = chunk(256);
        let a = c.bump(40).unwrap();
        let _k1 = c.bump(8).unwrap();
        let b = c.bump(32).unwrap();
        let _k2 = c.bump(8).unwrap();
        c.release(a, 40);
        c.release(b, 32);

        // Neither cell holds two requests of 24; the 32-byte one is tighter
        assert_eq!(c.take_dead(24), Some(b + 8));
        assert_eq!(c.total_dead(), 48);
        assert!(c.verify().is_ok());
    }

    #[test]
    fn test_take_dead_rejects_when_too_small() {
        let mut c = chunk(64);
        let a = c.bump(8).unwrap();
        let _b = c.bump(8).unwrap();
        c.release(a, 8);
        assert_eq!(c.take_dead(16), None);
    }

    #[test]
    fn test_realloc_in_place() {
        let mut c = chunk(64);
        let a = c.bump(16).unwrap();
        assert!(c.realloc_in_place(a, 16, 48));
        assert_eq!(c.first_avail(), 48);
        assert!(!c.realloc_in_place(a, 48, 72));
        assert!(c.realloc_in_place(a, 48, 8));
        assert_eq!(c.first_avail(), 8);

        let _b = c.bump(8).unwrap();
        assert!(!c.realloc_in_place(a, 8, 16));
    }

    #[test]
    fn test_pack_coalesces_and_returns_tail() {
        let mut c = chunk(128);
        let blocks: Vec<u32> = (0..6).map(|_| c.bump(16).unwrap()).collect();
        c.release(blocks[1], 16);
        c.release(blocks[2], 16);
        c.release(blocks[4], 16);
        assert_eq!(c.dead_cells().count(), 3);

        let reclaimed = c.pack();
        assert_eq!(reclaimed, 0);
        assert_eq!(c.dead_cells().collect::<Vec<_>>(), vec![(16, 32), (64, 16)]);

        c.release(blocks[5], 16);
        assert_eq!(c.first_avail(), 80);
        assert_eq!(c.pack(), 16);
        assert_eq!(c.first_avail(), 64);
        assert!(c.verify().is_ok());
    }

    #[test]
    fn test_take_data_leaves_vacant_chunk() {
        let mut c = chunk(32);
        c.bump(8);
        let data = c.take_data();
        assert_eq!(data.len(), 32);
        assert!(c.is_vacant());
        assert_eq!(c.bump(8), None);
    }
}
