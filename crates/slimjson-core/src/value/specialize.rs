//! Array specialization automaton
//!
//! An array starts unset and locks onto bool, int or double storage with its
//! first element. Mixed numbers either widen ints to doubles or demote to
//! generic storage depending on the `int_to_double` setting; anything else
//! demotes, and generic storage never specializes again.

use super::{Elem, Kind, Value};
use crate::config::limits::VALUE_SIZE;

/// Storage state of an array being filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayState {
    Unset,
    Bool,
    Int,
    Double,
    Generic,
}

/// Category of an element about to be appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementClass {
    Bool,
    Int,
    Double,
    /// Strings, null, unsigned integers and containers
    Other,
}

/// Work a caller must perform to apply one append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Append the raw payload in the new state's layout
    Append,
    /// Append an integer converted to a double
    AppendAsDouble,
    /// Rewrite stored ints as doubles, then append the double
    IntsToDoubles,
    /// Rewrite stored raw payloads as full values, then append a value
    Demote,
    /// Append a full value
    Generic,
}

impl ArrayState {
    /// State of an existing array; `None` for non-array kinds.
    ///
    /// A plain array that has never settled on the generic layout is still
    /// free to specialize, whether or not it has reserved storage.
    pub fn of(kind: Kind, settled: bool) -> Option<Self> {
        Some(match kind {
            Kind::Array if settled => ArrayState::Generic,
            Kind::Array => ArrayState::Unset,
            Kind::BoolArray => ArrayState::Bool,
            Kind::IntArray => ArrayState::Int,
            Kind::DoubleArray => ArrayState::Double,
            _ => return None,
        })
    }

    /// Storage kind for this state
    pub fn kind(self) -> Kind {
        match self {
            ArrayState::Unset | ArrayState::Generic => Kind::Array,
            ArrayState::Bool => Kind::BoolArray,
            ArrayState::Int => Kind::IntArray,
            ArrayState::Double => Kind::DoubleArray,
        }
    }

    /// Element layout for this state
    pub fn elem(self) -> Elem {
        match self {
            ArrayState::Unset | ArrayState::Generic => Elem::Value,
            ArrayState::Bool => Elem::Bool,
            ArrayState::Int => Elem::Int,
            ArrayState::Double => Elem::Double,
        }
    }

    /// Whether elements are stored as raw payloads
    pub fn is_specialized(self) -> bool {
        matches!(self, ArrayState::Bool | ArrayState::Int | ArrayState::Double)
    }

    /// Transition on appending an element of class `class`
    pub fn push(self, class: ElementClass, int_to_double: bool) -> (ArrayState, Step) {
        use ArrayState as S;
        use ElementClass as C;
        match (self, class) {
            (S::Generic, _) => (S::Generic, Step::Generic),
            (S::Unset, C::Bool) => (S::Bool, Step::Append),
            (S::Unset, C::Int) => (S::Int, Step::Append),
            (S::Unset, C::Double) => (S::Double, Step::Append),
            (S::Unset, C::Other) => (S::Generic, Step::Generic),
            (S::Bool, C::Bool) | (S::Int, C::Int) | (S::Double, C::Double) => (self, Step::Append),
            (S::Int, C::Double) if int_to_double => (S::Double, Step::IntsToDoubles),
            (S::Double, C::Int) if int_to_double => (S::Double, Step::AppendAsDouble),
            _ => (S::Generic, Step::Demote),
        }
    }
}

impl ElementClass {
    /// Class of an already decoded value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ElementClass::Bool,
            Value::Int64(_) => ElementClass::Int,
            Value::Double(_) => ElementClass::Double,
            _ => ElementClass::Other,
        }
    }
}

/// Write the raw payload of a bool, int or double value
pub(crate) fn write_raw(out: &mut [u8], elem: Elem, value: &Value) {
    match (elem, *value) {
        (Elem::Bool, Value::Bool(b)) => out[0] = u8::from(b),
        (Elem::Int, Value::Int64(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (Elem::Double, Value::Double(v)) => out[..8].copy_from_slice(&v.to_bits().to_le_bytes()),
        (Elem::Double, Value::Int64(v)) => {
            out[..8].copy_from_slice(&(v as f64).to_bits().to_le_bytes());
        }
        _ => debug_assert!(false, "{value:?} has no raw {elem:?} payload"),
    }
}

/// Decode the raw payload of a specialized element
pub(crate) fn raw_scalar(elem: Elem, raw: &[u8]) -> Value {
    let word = || {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&raw[..8]);
        bytes
    };
    match elem {
        Elem::Bool => Value::Bool(raw[0] != 0),
        Elem::Int => Value::Int64(i64::from_le_bytes(word())),
        Elem::Double => Value::Double(f64::from_bits(u64::from_le_bytes(word()))),
        Elem::Value | Elem::Member => {
            debug_assert!(false, "{elem:?} is not a raw layout");
            Value::Null
        }
    }
}

/// Rewrite `count` raw payloads at the start of `buf` as full value cells.
///
/// Walks backwards so every payload is read before a wider cell overwrites
/// it; `buf` must hold `count * VALUE_SIZE` bytes.
pub(crate) fn widen_in_place(buf: &mut [u8], elem: Elem, count: usize) {
    let width = elem.width();
    for i in (0..count).rev() {
        let value = raw_scalar(elem, &buf[i * width..(i + 1) * width]);
        buf[i * VALUE_SIZE..(i + 1) * VALUE_SIZE].copy_from_slice(&value.encode());
    }
}

/// Rewrite `count` int payloads at the start of `buf` as doubles
pub(crate) fn ints_to_doubles(buf: &mut [u8], count: usize) {
    for slot in buf[..count * 8].chunks_exact_mut(8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(slot);
        let converted = i64::from_le_bytes(raw) as f64;
        slot.copy_from_slice(&converted.to_bits().to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_element_picks_layout() {
        let unset = ArrayState::Unset;
        assert_eq!(unset.push(ElementClass::Bool, true), (ArrayState::Bool, Step::Append));
        assert_eq!(unset.push(ElementClass::Int, true), (ArrayState::Int, Step::Append));
        assert_eq!(unset.push(ElementClass::Double, false), (ArrayState::Double, Step::Append));
        assert_eq!(unset.push(ElementClass::Other, true), (ArrayState::Generic, Step::Generic));
    }

    #[test]
    fn test_mixed_numbers_follow_setting() {
        assert_eq!(
            ArrayState::Int.push(ElementClass::Double, true),
            (ArrayState::Double, Step::IntsToDoubles)
        );
        assert_eq!(
            ArrayState::Double.push(ElementClass::Int, true),
            (ArrayState::Double, Step::AppendAsDouble)
        );
        assert_eq!(
            ArrayState::Int.push(ElementClass::Double, false),
            (ArrayState::Generic, Step::Demote)
        );
        assert_eq!(
            ArrayState::Double.push(ElementClass::Int, false),
            (ArrayState::Generic, Step::Demote)
        );
    }

    #[test]
    fn test_generic_is_absorbing() {
        for class in [
            ElementClass::Bool,
            ElementClass::Int,
            ElementClass::Double,
            ElementClass::Other,
        ] {
            assert_eq!(
                ArrayState::Generic.push(class, true),
                (ArrayState::Generic, Step::Generic)
            );
        }
        assert_eq!(
            ArrayState::Bool.push(ElementClass::Int, true),
            (ArrayState::Generic, Step::Demote)
        );
    }

    #[test]
    fn test_state_of_existing_arrays() {
        assert_eq!(ArrayState::of(Kind::Array, false), Some(ArrayState::Unset));
        assert_eq!(ArrayState::of(Kind::Array, true), Some(ArrayState::Generic));
        assert_eq!(ArrayState::of(Kind::IntArray, true), Some(ArrayState::Int));
        assert_eq!(ArrayState::of(Kind::Object, false), None);
    }

    #[test]
    fn test_widen_in_place() {
        let mut buf = vec![0u8; 3 * VALUE_SIZE];
        for (i, v) in [7i64, -1, 40].iter().enumerate() {
            write_raw(&mut buf[i * 8..], Elem::Int, &Value::Int64(*v));
        }
        widen_in_place(&mut buf, Elem::Int, 3);
        let decoded: Vec<Value> = buf.chunks_exact(VALUE_SIZE).map(Value::decode).collect();
        assert_eq!(
            decoded,
            vec![Value::Int64(7), Value::Int64(-1), Value::Int64(40)]
        );
    }

    #[test]
    fn test_widen_bools() {
        let mut buf = vec![0u8; 2 * VALUE_SIZE];
        buf[0] = 1;
        buf[1] = 0;
        widen_in_place(&mut buf, Elem::Bool, 2);
        assert_eq!(Value::decode(&buf[..VALUE_SIZE]), Value::Bool(true));
        assert_eq!(Value::decode(&buf[VALUE_SIZE..]), Value::Bool(false));
    }

    #[test]
    fn test_ints_to_doubles() {
        let mut buf = vec![0u8; 16];
        write_raw(&mut buf[..8], Elem::Int, &Value::Int64(3));
        write_raw(&mut buf[8..], Elem::Int, &Value::Int64(-5));
        ints_to_doubles(&mut buf, 2);
        assert_eq!(raw_scalar(Elem::Double, &buf[..8]), Value::Double(3.0));
        assert_eq!(raw_scalar(Elem::Double, &buf[8..]), Value::Double(-5.0));
    }
}
