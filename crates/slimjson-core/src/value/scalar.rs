use super::ElementClass;
use crate::strings::StrInput;
use bytes::Bytes;

/// Scalar written into a document
///
/// Unsigned inputs stay unsigned: `UInt64` is stored as-is and never joins
/// an int-specialized array.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar<'a> {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(StrInput<'a>),
}

impl Scalar<'_> {
    /// Automaton class of this scalar
    pub fn class(&self) -> ElementClass {
        match self {
            Scalar::Bool(_) => ElementClass::Bool,
            Scalar::Int64(_) => ElementClass::Int,
            Scalar::Double(_) => ElementClass::Double,
            Scalar::Null | Scalar::UInt64(_) | Scalar::Str(_) => ElementClass::Other,
        }
    }
}

impl From<()> for Scalar<'_> {
    fn from(_: ()) -> Self {
        Scalar::Null
    }
}

impl From<bool> for Scalar<'_> {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

macro_rules! signed_scalar {
    ($($t:ty),*) => {$(
        impl From<$t> for Scalar<'_> {
            fn from(v: $t) -> Self {
                Scalar::Int64(i64::from(v))
            }
        }
    )*};
}

macro_rules! unsigned_scalar {
    ($($t:ty),*) => {$(
        impl From<$t> for Scalar<'_> {
            fn from(v: $t) -> Self {
                Scalar::UInt64(u64::from(v))
            }
        }
    )*};
}

signed_scalar!(i8, i16, i32, i64);
unsigned_scalar!(u8, u16, u32, u64);

impl From<usize> for Scalar<'_> {
    fn from(v: usize) -> Self {
        Scalar::UInt64(v as u64)
    }
}

impl From<f32> for Scalar<'_> {
    fn from(v: f32) -> Self {
        Scalar::Double(f64::from(v))
    }
}

impl From<f64> for Scalar<'_> {
    fn from(v: f64) -> Self {
        Scalar::Double(v)
    }
}

impl<'a> From<&'a str> for Scalar<'a> {
    fn from(v: &'a str) -> Self {
        Scalar::Str(StrInput::from(v))
    }
}

impl<'a> From<&'a String> for Scalar<'a> {
    fn from(v: &'a String) -> Self {
        Scalar::Str(StrInput::from(v.as_str()))
    }
}

impl<'a> From<&'a [u8]> for Scalar<'a> {
    fn from(v: &'a [u8]) -> Self {
        Scalar::Str(StrInput::from(v))
    }
}

impl From<String> for Scalar<'_> {
    fn from(v: String) -> Self {
        Scalar::Str(StrInput::Shared(Bytes::from(v)))
    }
}

impl From<Bytes> for Scalar<'_> {
    fn from(v: Bytes) -> Self {
        Scalar::Str(StrInput::Shared(v))
    }
}

impl<'a> From<StrInput<'a>> for Scalar<'a> {
    fn from(v: StrInput<'a>) -> Self {
        Scalar::Str(v)
    }
}

impl<'a, T: Into<Scalar<'a>>> From<Option<T>> for Scalar<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}
