//! Value representation
//!
//! Every value occupies one 16-byte cell wherever it is stored: in a
//! container block, in a member after its key, or on the builder's scratch
//! stack. [`Value`] is the decoded form; [`Value::encode`] and
//! [`Value::decode`] convert between the two.
//!
//! Cell layout (little-endian):
//!
//! | bytes  | containers     | short string | long string | numbers |
//! |--------|----------------|--------------|-------------|---------|
//! | 0      | tag            | tag          | tag         | tag     |
//! | 1..2   | -              | content      | -           | -       |
//! | 2..4   | inline capa    | content      | -           | -       |
//! | 4..8   | size           | content      | length      | -       |
//! | 8..16  | block handle   | content      | string id   | payload |

mod container;
mod scalar;
mod short_string;
mod specialize;

pub use container::{Container, Elem, is_big_capacity};
pub use scalar::Scalar;
pub use short_string::ShortString;
pub use specialize::{ArrayState, ElementClass, Step};
pub(crate) use specialize::{ints_to_doubles, raw_scalar, widen_in_place, write_raw};

use crate::alloc::{Handle, read_u32};
use crate::config::limits::{MEMBER_SIZE, VALUE_SIZE};
use crate::strings::StrId;
use std::fmt;

/// Storage discriminant of a value
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    Object = 0,
    Array = 1,
    BoolArray = 2,
    IntArray = 3,
    DoubleArray = 4,
    ShortString = 5,
    LongString = 6,
    Int64 = 7,
    UInt64 = 8,
    Double = 9,
    True = 10,
    False = 11,
    Null = 12,
}

impl Kind {
    /// Decode a tag byte
    pub const fn from_tag(tag: u8) -> Option<Kind> {
        Some(match tag {
            0 => Kind::Object,
            1 => Kind::Array,
            2 => Kind::BoolArray,
            3 => Kind::IntArray,
            4 => Kind::DoubleArray,
            5 => Kind::ShortString,
            6 => Kind::LongString,
            7 => Kind::Int64,
            8 => Kind::UInt64,
            9 => Kind::Double,
            10 => Kind::True,
            11 => Kind::False,
            12 => Kind::Null,
            _ => return None,
        })
    }

    /// Tag byte stored in a cell
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Category used for uniform dispatch
    pub const fn meta(self) -> Meta {
        match self {
            Kind::Object => Meta::Object,
            Kind::Array | Kind::BoolArray | Kind::IntArray | Kind::DoubleArray => Meta::Array,
            Kind::ShortString | Kind::LongString => Meta::String,
            Kind::Int64 | Kind::UInt64 | Kind::Double => Meta::Number,
            Kind::True | Kind::False => Meta::Bool,
            Kind::Null => Meta::Null,
        }
    }

    /// Whether values of this kind own an element block
    #[inline]
    pub const fn is_container(self) -> bool {
        self.element().is_some()
    }

    /// Whether this is one of the raw-scalar array kinds
    #[inline]
    pub const fn is_specialized(self) -> bool {
        matches!(self, Kind::BoolArray | Kind::IntArray | Kind::DoubleArray)
    }

    /// Element layout for container kinds
    pub const fn element(self) -> Option<Elem> {
        match self {
            Kind::Object => Some(Elem::Member),
            Kind::Array => Some(Elem::Value),
            Kind::BoolArray => Some(Elem::Bool),
            Kind::IntArray => Some(Elem::Int),
            Kind::DoubleArray => Some(Elem::Double),
            _ => None,
        }
    }

    /// Lowercase name used in messages
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::BoolArray => "bool array",
            Kind::IntArray => "int array",
            Kind::DoubleArray => "double array",
            Kind::ShortString => "short string",
            Kind::LongString => "long string",
            Kind::Int64 => "int64",
            Kind::UInt64 => "uint64",
            Kind::Double => "double",
            Kind::True => "true",
            Kind::False => "false",
            Kind::Null => "null",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse category grouping storage kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Meta {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Meta::Object => "object",
            Meta::Array => "array",
            Meta::String => "string",
            Meta::Number => "number",
            Meta::Bool => "bool",
            Meta::Null => "null",
        })
    }
}

/// String too long to store inline, held by the string pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongString {
    /// Pool record
    pub id: StrId,
    /// Content length in bytes
    pub len: u32,
}

/// Decoded value cell
///
/// Values never own memory: container blocks and long strings belong to the
/// document (and its string pool) the cell was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Object(Container),
    Array(Container),
    BoolArray(Container),
    IntArray(Container),
    DoubleArray(Container),
    ShortString(ShortString),
    LongString(LongString),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Bool(bool),
    Null,
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Storage discriminant
    pub fn kind(&self) -> Kind {
        match self {
            Value::Object(_) => Kind::Object,
            Value::Array(_) => Kind::Array,
            Value::BoolArray(_) => Kind::BoolArray,
            Value::IntArray(_) => Kind::IntArray,
            Value::DoubleArray(_) => Kind::DoubleArray,
            Value::ShortString(_) => Kind::ShortString,
            Value::LongString(_) => Kind::LongString,
            Value::Int64(_) => Kind::Int64,
            Value::UInt64(_) => Kind::UInt64,
            Value::Double(_) => Kind::Double,
            Value::Bool(true) => Kind::True,
            Value::Bool(false) => Kind::False,
            Value::Null => Kind::Null,
        }
    }

    /// Coarse category
    #[inline]
    pub fn meta(&self) -> Meta {
        self.kind().meta()
    }

    /// Container header, for arrays and objects
    pub fn container(&self) -> Option<Container> {
        match *self {
            Value::Object(c)
            | Value::Array(c)
            | Value::BoolArray(c)
            | Value::IntArray(c)
            | Value::DoubleArray(c) => Some(c),
            _ => None,
        }
    }

    /// Container value of `kind`; non-container kinds yield `Null`
    pub fn with_container(kind: Kind, container: Container) -> Value {
        match kind {
            Kind::Object => Value::Object(container),
            Kind::Array => Value::Array(container),
            Kind::BoolArray => Value::BoolArray(container),
            Kind::IntArray => Value::IntArray(container),
            Kind::DoubleArray => Value::DoubleArray(container),
            _ => {
                debug_assert!(false, "{kind} is not a container kind");
                Value::Null
            }
        }
    }

    /// Empty object without storage
    pub const fn empty_object() -> Value {
        Value::Object(Container::EMPTY)
    }

    /// Empty array without storage
    pub const fn empty_array() -> Value {
        Value::Array(Container::EMPTY)
    }

    /// Encode into a cell
    pub fn encode(&self) -> [u8; VALUE_SIZE] {
        let mut cell = [0u8; VALUE_SIZE];
        cell[0] = self.kind().tag();
        match *self {
            Value::Object(c)
            | Value::Array(c)
            | Value::BoolArray(c)
            | Value::IntArray(c)
            | Value::DoubleArray(c) => {
                cell[1] = u8::from(c.is_settled());
                cell[2..4].copy_from_slice(&c.inline_capacity().to_le_bytes());
                cell[4..8].copy_from_slice(&c.len().to_le_bytes());
                cell[8..16].copy_from_slice(&c.block().to_bytes());
            }
            Value::ShortString(s) => cell[1..].copy_from_slice(s.raw()),
            Value::LongString(s) => {
                cell[4..8].copy_from_slice(&s.len.to_le_bytes());
                cell[8..16].copy_from_slice(&s.id.handle().to_bytes());
            }
            Value::Int64(v) => cell[8..16].copy_from_slice(&v.to_le_bytes()),
            Value::UInt64(v) => cell[8..16].copy_from_slice(&v.to_le_bytes()),
            Value::Double(v) => cell[8..16].copy_from_slice(&v.to_bits().to_le_bytes()),
            Value::Bool(_) | Value::Null => {}
        }
        cell
    }

    /// Decode a cell written by [`Value::encode`]
    pub fn decode(cell: &[u8]) -> Value {
        let Some(kind) = Kind::from_tag(cell[0]) else {
            debug_assert!(false, "invalid value tag {}", cell[0]);
            return Value::Null;
        };
        let payload = || {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&cell[8..16]);
            raw
        };
        match kind {
            Kind::Object
            | Kind::Array
            | Kind::BoolArray
            | Kind::IntArray
            | Kind::DoubleArray => {
                let capa = u16::from_le_bytes([cell[2], cell[3]]);
                let container =
                    Container::from_raw(Handle::from_bytes(&cell[8..16]), read_u32(cell, 4), capa)
                        .with_settled(cell[1] & 1 != 0);
                Value::with_container(kind, container)
            }
            Kind::ShortString => Value::ShortString(ShortString::from_raw(&cell[1..])),
            Kind::LongString => Value::LongString(LongString {
                id: StrId::from_handle(Handle::from_bytes(&cell[8..16])),
                len: read_u32(cell, 4),
            }),
            Kind::Int64 => Value::Int64(i64::from_le_bytes(payload())),
            Kind::UInt64 => Value::UInt64(u64::from_le_bytes(payload())),
            Kind::Double => Value::Double(f64::from_bits(u64::from_le_bytes(payload()))),
            Kind::True => Value::Bool(true),
            Kind::False => Value::Bool(false),
            Kind::Null => Value::Null,
        }
    }
}

/// Encode an object member cell
pub fn encode_member(key: StrId, value: &Value) -> [u8; MEMBER_SIZE] {
    let mut cell = [0u8; MEMBER_SIZE];
    cell[..8].copy_from_slice(&key.handle().to_bytes());
    cell[8..].copy_from_slice(&value.encode());
    cell
}

/// Decode a member cell into its key and value
pub fn decode_member(cell: &[u8]) -> (StrId, Value) {
    (
        StrId::from_handle(Handle::from_bytes(&cell[..8])),
        Value::decode(&cell[8..MEMBER_SIZE]),
    )
}
