//! Byte stack staging the contents of open containers

use crate::config::limits::{SCRATCH_GROWTH, SCRATCH_INITIAL_CAPACITY, grown};

/// Growable byte buffer, separate from the arena
#[derive(Debug, Default)]
pub(crate) struct ScratchStack {
    buf: Vec<u8>,
}

impl ScratchStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Push `bytes`, returning their offset
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let offset = self.buf.len();
        self.ensure(offset + bytes.len());
        self.buf.extend_from_slice(bytes);
        offset
    }

    /// Grow or cut to `len` bytes; new bytes are zero
    pub fn resize(&mut self, len: usize) {
        self.ensure(len);
        self.buf.resize(len, 0);
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.buf[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.buf[offset..offset + len]
    }

    /// Drop the contents and free the buffer
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }

    fn ensure(&mut self, needed: usize) {
        let capacity = self.buf.capacity();
        if needed <= capacity {
            return;
        }
        let target = grown(capacity, SCRATCH_GROWTH)
            .max(SCRATCH_INITIAL_CAPACITY)
            .max(needed);
        self.buf.reserve_exact(target - self.buf.len());
    }
}
