//! Inline short strings

use crate::config::limits::{SHORT_STRING_CAPACITY, SHORT_STRING_MAX_LEN};
use crate::error::Result;
use std::fmt;

/// String stored directly inside a value cell.
///
/// The last byte of the buffer holds `SHORT_STRING_MAX_LEN - len`, so a
/// string of the maximum length ends with a zero byte there and every
/// shorter string is zero-terminated by its padding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortString {
    buf: [u8; SHORT_STRING_CAPACITY],
}

impl ShortString {
    /// Store `bytes` inline, or `None` if they do not fit
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > SHORT_STRING_MAX_LEN {
            return None;
        }
        let mut buf = [0u8; SHORT_STRING_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[SHORT_STRING_MAX_LEN] = (SHORT_STRING_MAX_LEN - bytes.len()) as u8;
        Some(Self { buf })
    }

    /// Whether `len` bytes fit inline
    #[inline]
    pub const fn fits(len: usize) -> bool {
        len <= SHORT_STRING_MAX_LEN
    }

    /// Content length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        SHORT_STRING_MAX_LEN - self.buf[SHORT_STRING_MAX_LEN] as usize
    }

    /// Whether the string is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// Content as UTF-8
    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }

    pub(crate) fn raw(&self) -> &[u8; SHORT_STRING_CAPACITY] {
        &self.buf
    }

    pub(crate) fn from_raw(raw: &[u8]) -> Self {
        let mut buf = [0u8; SHORT_STRING_CAPACITY];
        buf.copy_from_slice(&raw[..SHORT_STRING_CAPACITY]);
        if buf[SHORT_STRING_MAX_LEN] as usize > SHORT_STRING_MAX_LEN {
            buf[SHORT_STRING_MAX_LEN] = SHORT_STRING_MAX_LEN as u8;
        }
        Self { buf }
    }
}

impl fmt::Debug for ShortString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortString({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string_lengths() {
        let empty = ShortString::new(b"").unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.raw()[SHORT_STRING_MAX_LEN], 14);

        let hi = ShortString::new(b"hi").unwrap();
        assert_eq!(hi.len(), 2);
        assert_eq!(hi.as_str().unwrap(), "hi");
        assert_eq!(hi.raw()[2], 0);

        let full = ShortString::new(b"abcdefghijklmn").unwrap();
        assert_eq!(full.len(), 14);
        assert_eq!(full.raw()[SHORT_STRING_MAX_LEN], 0);
        assert_eq!(full.as_bytes(), b"abcdefghijklmn");
    }

    #[test]
    fn test_short_string_rejects_long_content() {
        assert!(ShortString::new(b"abcdefghijklmno").is_none());
        assert!(ShortString::fits(14));
        assert!(!ShortString::fits(15));
    }

    #[test]
    fn test_short_string_raw_roundtrip() {
        let s = ShortString::new("héllo".as_bytes()).unwrap();
        let back = ShortString::from_raw(s.raw());
        assert_eq!(back, s);
        assert_eq!(back.as_str().unwrap(), "héllo");
    }
}
