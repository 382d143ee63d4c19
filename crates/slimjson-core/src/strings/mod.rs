//! String interning
//!
//! Long strings and every object key live in a [`StringPool`]: a
//! separate-chaining hash table whose chains are kept sorted by content, with
//! records allocated from a stable-addressing arena. A [`StrId`] is the
//! record's handle, so two ids are equal exactly when they name the same
//! interned string.

mod pool;
mod record;

pub use pool::{Iter, PoolStats, SharedStringPool, StringPool};

use crate::alloc::Handle;
use bytes::Bytes;

/// Identity of an interned string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(Handle);

impl StrId {
    pub(crate) const fn from_handle(handle: Handle) -> Self {
        Self(handle)
    }

    /// Arena handle of the string record
    #[inline]
    pub const fn handle(self) -> Handle {
        self.0
    }
}

/// String content handed to the pool
///
/// Borrowed content is copied into pool storage when it is first interned.
/// Shared content is kept by reference count, so the pool never outlives
/// the bytes it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrInput<'a> {
    Borrowed(&'a [u8]),
    Shared(Bytes),
}

impl StrInput<'_> {
    /// Content bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StrInput::Borrowed(bytes) => bytes,
            StrInput::Shared(bytes) => bytes,
        }
    }

    /// Content length
    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the content is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Detach from the borrowed lifetime by copying borrowed content
    pub fn into_owned(self) -> StrInput<'static> {
        match self {
            StrInput::Borrowed(bytes) => StrInput::Shared(Bytes::copy_from_slice(bytes)),
            StrInput::Shared(bytes) => StrInput::Shared(bytes),
        }
    }
}

impl<'a> From<&'a str> for StrInput<'a> {
    fn from(s: &'a str) -> Self {
        StrInput::Borrowed(s.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for StrInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        StrInput::Borrowed(bytes)
    }
}

impl From<Bytes> for StrInput<'_> {
    fn from(bytes: Bytes) -> Self {
        StrInput::Shared(bytes)
    }
}

impl From<String> for StrInput<'_> {
    fn from(s: String) -> Self {
        StrInput::Shared(Bytes::from(s))
    }
}
