//! String record layout
//!
//! `[flags+len: u32][next: Handle][payload]` where the payload is the
//! content for owned records and a `u32` index into the pool's shared-bytes
//! table otherwise.

use crate::alloc::{Handle, read_u32, write_u32};
use std::cmp::Ordering;

pub(crate) const HEADER_SIZE: usize = 4 + Handle::ENCODED_SIZE;
const NEXT_OFFSET: usize = 4;
const LEN_SHIFT: u32 = 2;

bitflags::bitflags! {
    /// Per-record flags stored in the low bits of the header word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct RecordFlags: u32 {
        /// Content is stored inside the record
        const OWNED = 0b01;
        /// Used as an object key at least once; never cleared
        const KEY   = 0b10;
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub flags: RecordFlags,
    pub len: u32,
    pub next: Handle,
}

impl Header {
    pub fn read(bytes: &[u8]) -> Self {
        let word = read_u32(bytes, 0);
        Self {
            flags: RecordFlags::from_bits_truncate(word),
            len: word >> LEN_SHIFT,
            next: Handle::from_bytes(&bytes[NEXT_OFFSET..HEADER_SIZE]),
        }
    }

    pub fn write(&self, bytes: &mut [u8]) {
        write_u32(bytes, 0, self.flags.bits() | (self.len << LEN_SHIFT));
        bytes[NEXT_OFFSET..HEADER_SIZE].copy_from_slice(&self.next.to_bytes());
    }

    /// Bytes occupied by the record
    pub fn record_size(&self) -> usize {
        record_size(self.len as usize, self.flags.contains(RecordFlags::OWNED))
    }
}

/// Bytes needed for a record holding `len` bytes of content
pub(crate) fn record_size(len: usize, owned: bool) -> usize {
    HEADER_SIZE + if owned { len } else { 4 }
}

pub(crate) fn write_next(bytes: &mut [u8], next: Handle) {
    bytes[NEXT_OFFSET..HEADER_SIZE].copy_from_slice(&next.to_bytes());
}

pub(crate) fn set_flags(bytes: &mut [u8], flags: RecordFlags) {
    let word = read_u32(bytes, 0) | flags.bits();
    write_u32(bytes, 0, word);
}

/// Chain order: shorter content first, then bytewise
pub(crate) fn compare(stored: &[u8], probe: &[u8]) -> Ordering {
    stored
        .len()
        .cmp(&probe.len())
        .then_with(|| stored.cmp(probe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            flags: RecordFlags::OWNED | RecordFlags::KEY,
            len: 1234,
            next: Handle::in_chunk(3, 96),
        };
        let mut bytes = [0u8; HEADER_SIZE];
        header.write(&mut bytes);
        assert_eq!(Header::read(&bytes), header);
        assert_eq!(header.record_size(), HEADER_SIZE + 1234);
    }

    #[test]
    fn test_flags_are_sticky() {
        let mut bytes = [0u8; HEADER_SIZE];
        Header {
            flags: RecordFlags::empty(),
            len: 20,
            next: Handle::NONE,
        }
        .write(&mut bytes);
        set_flags(&mut bytes, RecordFlags::KEY);
        set_flags(&mut bytes, RecordFlags::empty());
        let header = Header::read(&bytes);
        assert!(header.flags.contains(RecordFlags::KEY));
        assert_eq!(header.len, 20);
        assert_eq!(header.record_size(), HEADER_SIZE + 4);
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(compare(b"zz", b"aaa"), Ordering::Less);
        assert_eq!(compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(compare(b"abc", b"abc"), Ordering::Equal);
        assert_eq!(compare(b"b", b"a"), Ordering::Greater);
    }
}
