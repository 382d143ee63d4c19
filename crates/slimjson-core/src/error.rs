//! Error types for slimjson operations

use crate::value::Kind;

/// Result type alias for slimjson operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for slimjson operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A fixed-capacity backend ran out of memory
    #[error("Allocator exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Bytes requested from the backend
        requested: usize,
        /// Bytes still available in the backend budget
        available: usize,
    },

    /// Value accessed or mutated as the wrong kind
    #[error("Kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// What the operation requires
        expected: &'static str,
        /// Kind actually stored
        found: Kind,
    },

    /// Checked indexed access past the end of a container
    #[error("Index {index} out of range for length {len}")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Container length
        len: usize,
    },

    /// Event sequence is not depth-balanced or out of place
    #[error("Unbalanced events: {0}")]
    Unbalanced(String),

    /// Shared string pool is already borrowed elsewhere
    #[error("String pool is already borrowed")]
    PoolBorrowed,

    /// String length exceeds the record length field
    #[error("String too long: {0} bytes")]
    StringTooLong(usize),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion failed: {0}")]
    Utf8(String),
}

impl Error {
    /// Create an exhaustion error
    pub fn exhausted(requested: usize, available: usize) -> Self {
        Self::Exhausted {
            requested,
            available,
        }
    }

    /// Create a kind mismatch error
    pub fn mismatch(expected: &'static str, found: Kind) -> Self {
        Self::KindMismatch { expected, found }
    }

    /// Create an out of range error
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }

    /// Create an unbalanced events error
    pub fn unbalanced(message: impl Into<String>) -> Self {
        Self::Unbalanced(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error is recoverable by freeing memory or retrying
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Utf8(err.to_string())
    }
}

impl From<std::cell::BorrowMutError> for Error {
    fn from(_: std::cell::BorrowMutError) -> Self {
        Self::PoolBorrowed
    }
}

impl From<std::cell::BorrowError> for Error {
    fn from(_: std::cell::BorrowError) -> Self {
        Self::PoolBorrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::exhausted(64, 16);
        assert_eq!(
            err.to_string(),
            "Allocator exhausted: requested 64 bytes, 16 available"
        );

        let err = Error::mismatch("array", Kind::Object);
        assert_eq!(err.to_string(), "Kind mismatch: expected array, found object");

        let err = Error::out_of_range(5, 3);
        assert_eq!(err.to_string(), "Index 5 out of range for length 3");
    }

    #[test]
    fn test_exhaustion_classification() {
        assert!(Error::exhausted(1, 0).is_exhaustion());
        assert!(!Error::unbalanced("x").is_exhaustion());
        assert!(!Error::PoolBorrowed.is_exhaustion());
    }

    #[test]
    fn test_utf8_conversion() {
        let bytes = [0xffu8, 0xfe];
        let err: Error = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, Error::Utf8(_)));
    }
}
