//! Numeric limits shared by the value layout, the arena and the string pool
//!
//! These values fix the binary layout of cells stored in the arena and the
//! growth policies of every growable structure. Changing a layout constant
//! changes the meaning of bytes already written, so they are not runtime
//! options.
//!
//! # Growth Policies
//!
//! - **Containers** grow by [`CONTAINER_GROWTH`] when an append overflows.
//! - **Chunk tables** grow by [`CHUNK_TABLE_GROWTH`], starting at one slot.
//! - **Bucket arrays** grow by [`BUCKET_GROWTH`], starting at
//!   [`INITIAL_BUCKET_COUNT`].
//! - **Scratch stacks** start at [`SCRATCH_INITIAL_CAPACITY`] bytes and grow
//!   by [`SCRATCH_GROWTH`].

/// Alignment of every arena cell, in bytes.
pub const CELL_ALIGNMENT: usize = 8;

/// Smallest dead cell: a 32-bit size followed by a 32-bit next link.
pub const DEAD_CELL_SIZE: usize = 8;

/// Containers holding this many elements or more use the big layout.
///
/// The inline capacity field is 16 bits wide; its all-ones value marks the
/// big layout, so the largest inline capacity is one less.
pub const SMALL_CAPACITY_LIMIT: u32 = u16::MAX as u32;

/// Marker stored in the inline capacity field of a big container.
pub const BIG_CAPACITY_MARKER: u16 = u16::MAX;

/// Header in front of big container elements: 32-bit capacity plus padding.
pub const BIG_HEADER_SIZE: usize = 8;

/// Size of an encoded value cell.
pub const VALUE_SIZE: usize = 16;

/// Size of an encoded member cell: key handle then value cell.
pub const MEMBER_SIZE: usize = 8 + VALUE_SIZE;

/// Inline buffer of a short string.
pub const SHORT_STRING_CAPACITY: usize = VALUE_SIZE - 1;

/// Longest string stored inline; its last byte doubles as the length slot.
pub const SHORT_STRING_MAX_LEN: usize = SHORT_STRING_CAPACITY - 1;

/// Longest string the pool can record (30-bit length field).
pub const MAX_STRING_LEN: usize = (1 << 30) - 1;

/// Default arena chunk size for object storage and string storage.
pub const DEFAULT_CHUNK_SIZE: u32 = 32_768;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: u32 = 1 << 24;

/// Container capacity growth factor.
pub const CONTAINER_GROWTH: f64 = 1.5;

/// Chunk table growth factor.
pub const CHUNK_TABLE_GROWTH: f64 = 1.5;

/// Bucket array growth factor.
pub const BUCKET_GROWTH: f64 = 2.0;

/// Bucket count created on the first insertion into an empty pool.
pub const INITIAL_BUCKET_COUNT: u32 = 16;

/// Default maximum string pool load factor.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 1.5;

/// Initial scratch stack capacity in bytes.
pub const SCRATCH_INITIAL_CAPACITY: usize = 1024;

/// Scratch stack growth factor.
pub const SCRATCH_GROWTH: f64 = 2.0;

/// Round `size` up to [`CELL_ALIGNMENT`].
#[inline]
pub const fn align_cell(size: usize) -> usize {
    (size + CELL_ALIGNMENT - 1) & !(CELL_ALIGNMENT - 1)
}

/// Next capacity for a growable table, `ceil(current * factor)` or one.
#[inline]
pub fn grown(current: usize, factor: f64) -> usize {
    if current == 0 {
        1
    } else {
        ((current as f64) * factor).ceil() as usize
    }
}
