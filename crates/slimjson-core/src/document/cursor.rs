//! Read and write cursors over document values

use super::{Document, Place, storage};
use crate::alloc::{Backend, Handle, HeapBackend};
use crate::config::limits::{MEMBER_SIZE, VALUE_SIZE};
use crate::error::{Error, Result};
use crate::events::{EventSink, Flow, forward};
use crate::strings::{StrId, StrInput};
use crate::value::{
    self, Container, Elem, ElementClass, Kind, Meta, Scalar, ShortString, Value, decode_member,
    encode_member,
};
use smallvec::SmallVec;
use std::cell::Ref;
use std::fmt;
use std::ops::Deref;

/// Borrowed string content, inline or from the string pool
///
/// A pooled view holds a shared borrow of the pool; drop it before mutating
/// a document that shares the pool.
pub enum StrView<'a> {
    Inline(ShortString),
    Pooled(Ref<'a, [u8]>),
}

impl StrView<'_> {
    /// Content bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StrView::Inline(s) => s.as_bytes(),
            StrView::Pooled(bytes) => &**bytes,
        }
    }

    /// Content as UTF-8
    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }
}

impl Deref for StrView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for StrView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl PartialEq<str> for StrView<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for StrView<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for StrView<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

/// Read-only cursor on a value
pub struct ValueRef<'a, B: Backend = HeapBackend> {
    doc: &'a Document<B>,
    value: Value,
}

impl<B: Backend> Clone for ValueRef<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for ValueRef<'_, B> {}

impl<B: Backend> fmt::Debug for ValueRef<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRef").field("value", &self.value).finish()
    }
}

impl<'a, B: Backend> ValueRef<'a, B> {
    pub(crate) fn new(doc: &'a Document<B>, value: Value) -> Self {
        Self { doc, value }
    }

    /// Decoded cell
    pub fn value(&self) -> Value {
        self.value
    }

    /// Storage discriminant
    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    /// Coarse category
    pub fn meta(&self) -> Meta {
        self.value.meta()
    }

    pub fn is_object(&self) -> bool {
        self.kind() == Kind::Object
    }

    /// Any array kind, specialized or not
    pub fn is_array(&self) -> bool {
        self.meta() == Meta::Array
    }

    pub fn is_bool_array(&self) -> bool {
        self.kind() == Kind::BoolArray
    }

    pub fn is_int_array(&self) -> bool {
        self.kind() == Kind::IntArray
    }

    pub fn is_double_array(&self) -> bool {
        self.kind() == Kind::DoubleArray
    }

    pub fn is_string(&self) -> bool {
        self.meta() == Meta::String
    }

    pub fn is_short_string(&self) -> bool {
        self.kind() == Kind::ShortString
    }

    pub fn is_long_string(&self) -> bool {
        self.kind() == Kind::LongString
    }

    pub fn is_number(&self) -> bool {
        self.meta() == Meta::Number
    }

    pub fn is_int64(&self) -> bool {
        self.kind() == Kind::Int64
    }

    pub fn is_uint64(&self) -> bool {
        self.kind() == Kind::UInt64
    }

    pub fn is_double(&self) -> bool {
        self.kind() == Kind::Double
    }

    pub fn is_bool(&self) -> bool {
        self.meta() == Meta::Bool
    }

    pub fn is_null(&self) -> bool {
        self.kind() == Kind::Null
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.value {
            Value::Bool(b) => Ok(b),
            _ => Err(Error::mismatch("bool", self.kind())),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self.value {
            Value::Int64(v) => Ok(v),
            _ => Err(Error::mismatch("int64", self.kind())),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self.value {
            Value::UInt64(v) => Ok(v),
            _ => Err(Error::mismatch("uint64", self.kind())),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self.value {
            Value::Double(v) => Ok(v),
            _ => Err(Error::mismatch("double", self.kind())),
        }
    }

    /// String content, inline or pooled
    pub fn as_str(&self) -> Result<StrView<'a>> {
        match self.value {
            Value::ShortString(s) => Ok(StrView::Inline(s)),
            Value::LongString(s) => self.pooled(s.id),
            _ => Err(Error::mismatch("string", self.kind())),
        }
    }

    /// Elements or members of a container; zero for scalars
    pub fn len(&self) -> usize {
        self.value.container().map_or(0, |c| c.len() as usize)
    }

    /// Whether a container holds nothing; scalars count as empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element capacity of a container; zero for scalars
    pub fn capacity(&self) -> usize {
        self.value
            .container()
            .map_or(0, |c| c.capacity(&self.doc.arena) as usize)
    }

    /// Bytes reserved by the container's element block
    pub fn mem_size(&self) -> usize {
        self.layout()
            .map_or(0, |(c, elem)| c.mem_size(elem, &self.doc.arena))
    }

    /// Bytes of the element block in use
    pub fn mem_used(&self) -> usize {
        self.layout().map_or(0, |(c, elem)| c.mem_used(elem))
    }

    /// Whether the container uses the big layout
    pub fn is_big(&self) -> bool {
        self.value.container().is_some_and(|c| c.is_big())
    }

    /// Little-endian payload bytes of a bool, int or double array
    pub fn raw_payload(&self) -> Result<&'a [u8]> {
        match (self.layout(), self.kind()) {
            (Some((c, elem)), Kind::BoolArray | Kind::IntArray | Kind::DoubleArray) => {
                if c.block().is_none() {
                    return Ok(&[]);
                }
                let doc: &'a Document<B> = self.doc;
                Ok(doc.arena.bytes(c.data(), c.len() as usize * elem.width()))
            }
            _ => Err(Error::mismatch("specialized array", self.kind())),
        }
    }

    pub fn bools(&self) -> Result<impl Iterator<Item = bool> + use<'a, B>> {
        if !self.is_bool_array() {
            return Err(Error::mismatch("bool array", self.kind()));
        }
        Ok(self.raw_payload()?.iter().map(|&b| b != 0))
    }

    pub fn ints(&self) -> Result<impl Iterator<Item = i64> + use<'a, B>> {
        if !self.is_int_array() {
            return Err(Error::mismatch("int array", self.kind()));
        }
        Ok(self.raw_payload()?.chunks_exact(8).map(|b| i64::from_le_bytes(word(b))))
    }

    pub fn doubles(&self) -> Result<impl Iterator<Item = f64> + use<'a, B>> {
        if !self.is_double_array() {
            return Err(Error::mismatch("double array", self.kind()));
        }
        Ok(self
            .raw_payload()?
            .chunks_exact(8)
            .map(|b| f64::from_bits(u64::from_le_bytes(word(b)))))
    }

    /// Element `index` of an array, or the value of member `index`
    pub fn get(&self, index: usize) -> Result<ValueRef<'a, B>> {
        let Some((c, elem)) = self.layout() else {
            return Err(Error::mismatch("array or object", self.kind()));
        };
        if index >= c.len() as usize {
            return Err(Error::out_of_range(index, c.len() as usize));
        }
        Ok(self.child(c, elem, index as u32))
    }

    /// [`ValueRef::get`] without the kind and bounds checks
    pub fn get_unchecked(&self, index: usize) -> ValueRef<'a, B> {
        debug_assert!(index < self.len(), "index {index} out of range");
        match self.layout() {
            Some((c, elem)) => self.child(c, elem, index as u32),
            None => ValueRef::new(self.doc, Value::Null),
        }
    }

    /// Iterate over array elements (or member values)
    pub fn iter(&self) -> Elements<'a, B> {
        Elements {
            view: *self,
            index: 0,
            len: self.len(),
        }
    }

    /// Iterate over object members; empty for anything else
    pub fn members(&self) -> Members<'a, B> {
        let len = if self.is_object() { self.len() } else { 0 };
        Members {
            view: *self,
            index: 0,
            len,
        }
    }

    /// Key of member `index`
    pub fn key_at(&self, index: usize) -> Result<StrView<'a>> {
        let Value::Object(c) = self.value else {
            return Err(Error::mismatch("object", self.kind()));
        };
        if index >= c.len() as usize {
            return Err(Error::out_of_range(index, c.len() as usize));
        }
        self.pooled(self.key_id(c, index as u32))
    }

    /// Position of the member named `key`
    pub fn find_index(&self, key: impl AsRef<[u8]>) -> Option<usize> {
        let Value::Object(c) = self.value else {
            return None;
        };
        let id = self.doc.strings.try_borrow().ok()?.get(key)?;
        (0..c.len())
            .find(|&i| self.key_id(c, i) == id)
            .map(|i| i as usize)
    }

    /// Value of the member named `key`
    pub fn find(&self, key: impl AsRef<[u8]>) -> Option<ValueRef<'a, B>> {
        self.find_index(key).map(|index| self.get_unchecked(index))
    }

    /// Replay this value as events into `sink`.
    ///
    /// Specialized arrays produce the same events as generic arrays holding
    /// the same scalars.
    pub fn accept<S: EventSink + ?Sized>(&self, sink: &mut S) -> Result<Flow> {
        let mut frames: SmallVec<[VisitFrame; 16]> = SmallVec::new();
        let mut scratch = Vec::new();
        forward!(self.emit(self.value, sink, &mut frames, &mut scratch));

        while let Some(frame) = frames.last_mut() {
            if frame.index == frame.c.len() {
                let (elem, count) = (frame.elem, frame.c.len() as usize);
                frames.pop();
                if elem == Elem::Member {
                    forward!(sink.end_object(count));
                } else {
                    forward!(sink.end_array(count));
                }
                continue;
            }
            let (c, elem, index) = (frame.c, frame.elem, frame.index);
            frame.index += 1;

            if elem == Elem::Member {
                let cell = self.doc.arena.bytes(c.element(elem, index), MEMBER_SIZE);
                let (key, value) = decode_member(cell);
                scratch.clear();
                scratch.extend_from_slice(self.doc.strings.try_borrow()?.resolve(key));
                forward!(sink.key(StrInput::Borrowed(&scratch)));
                forward!(self.emit(value, sink, &mut frames, &mut scratch));
            } else {
                let child = self.child(c, elem, index).value;
                forward!(self.emit(child, sink, &mut frames, &mut scratch));
            }
        }
        Ok(Flow::Continue)
    }

    fn emit<S: EventSink + ?Sized>(
        &self,
        value: Value,
        sink: &mut S,
        frames: &mut SmallVec<[VisitFrame; 16]>,
        scratch: &mut Vec<u8>,
    ) -> Result<Flow> {
        match value {
            Value::Object(c) => {
                forward!(sink.begin_object());
                frames.push(VisitFrame {
                    c,
                    elem: Elem::Member,
                    index: 0,
                });
                Ok(Flow::Continue)
            }
            Value::Array(c) | Value::BoolArray(c) | Value::IntArray(c) | Value::DoubleArray(c) => {
                forward!(sink.begin_array());
                frames.push(VisitFrame {
                    c,
                    elem: value.kind().element().unwrap_or(Elem::Value),
                    index: 0,
                });
                Ok(Flow::Continue)
            }
            Value::ShortString(s) => sink.string(StrInput::Borrowed(s.as_bytes())),
            Value::LongString(s) => {
                scratch.clear();
                scratch.extend_from_slice(self.doc.strings.try_borrow()?.resolve(s.id));
                sink.string(StrInput::Borrowed(scratch))
            }
            Value::Int64(v) => sink.int64(v),
            Value::UInt64(v) => sink.uint64(v),
            Value::Double(v) => sink.double(v),
            Value::Bool(v) => sink.bool(v),
            Value::Null => sink.null(),
        }
    }

    fn layout(&self) -> Option<(Container, Elem)> {
        Some((self.value.container()?, self.kind().element()?))
    }

    fn child(&self, c: Container, elem: Elem, index: u32) -> ValueRef<'a, B> {
        let arena = &self.doc.arena;
        let value = match elem {
            Elem::Value => Value::decode(arena.bytes(c.element(elem, index), VALUE_SIZE)),
            Elem::Member => Value::decode(arena.bytes(c.element(elem, index).add(8), VALUE_SIZE)),
            Elem::Bool | Elem::Int | Elem::Double => {
                value::raw_scalar(elem, arena.bytes(c.element(elem, index), elem.width()))
            }
        };
        ValueRef::new(self.doc, value)
    }

    fn key_id(&self, c: Container, index: u32) -> StrId {
        let cell = self
            .doc
            .arena
            .bytes(c.element(Elem::Member, index), Handle::ENCODED_SIZE);
        StrId::from_handle(Handle::from_bytes(cell))
    }

    fn pooled(&self, id: StrId) -> Result<StrView<'a>> {
        let pool = self.doc.strings.try_borrow()?;
        Ok(StrView::Pooled(Ref::map(pool, |pool| pool.resolve(id))))
    }
}

#[cfg(feature = "unchecked")]
impl<B: Backend> ValueRef<'_, B> {
    /// Payload read without checking the discriminant
    pub fn as_bool_unchecked(&self) -> bool {
        debug_assert!(self.is_bool(), "{} read as bool", self.kind());
        self.kind() == Kind::True
    }

    /// Payload read without checking the discriminant
    pub fn as_i64_unchecked(&self) -> i64 {
        debug_assert!(self.is_int64(), "{} read as int64", self.kind());
        i64::from_le_bytes(self.payload())
    }

    /// Payload read without checking the discriminant
    pub fn as_u64_unchecked(&self) -> u64 {
        debug_assert!(self.is_uint64(), "{} read as uint64", self.kind());
        u64::from_le_bytes(self.payload())
    }

    /// Payload read without checking the discriminant
    pub fn as_f64_unchecked(&self) -> f64 {
        debug_assert!(self.is_double(), "{} read as double", self.kind());
        f64::from_bits(u64::from_le_bytes(self.payload()))
    }

    fn payload(&self) -> [u8; 8] {
        let cell = self.value.encode();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&cell[8..16]);
        raw
    }
}

fn word(bytes: &[u8]) -> [u8; 8] {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    raw
}

struct VisitFrame {
    c: Container,
    elem: Elem,
    index: u32,
}

/// Iterator over array elements
pub struct Elements<'a, B: Backend = HeapBackend> {
    view: ValueRef<'a, B>,
    index: usize,
    len: usize,
}

impl<'a, B: Backend> Iterator for Elements<'a, B> {
    type Item = ValueRef<'a, B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let item = self.view.get_unchecked(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for Elements<'_, B> {}

/// One object member
pub struct MemberRef<'a, B: Backend = HeapBackend> {
    view: ValueRef<'a, B>,
    key: StrId,
}

impl<'a, B: Backend> MemberRef<'a, B> {
    /// Interned key
    pub fn key_id(&self) -> StrId {
        self.key
    }

    /// Key content
    pub fn key(&self) -> Result<StrView<'a>> {
        self.view.pooled(self.key)
    }

    /// Member value
    pub fn value(&self) -> ValueRef<'a, B> {
        self.view
    }
}

/// Iterator over object members
pub struct Members<'a, B: Backend = HeapBackend> {
    view: ValueRef<'a, B>,
    index: usize,
    len: usize,
}

impl<'a, B: Backend> Iterator for Members<'a, B> {
    type Item = MemberRef<'a, B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let Value::Object(c) = self.view.value else {
            return None;
        };
        let index = self.index as u32;
        self.index += 1;
        Some(MemberRef {
            view: self.view.child(c, Elem::Member, index),
            key: self.view.key_id(c, index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for Members<'_, B> {}

/// Mutable cursor on a value
pub struct ValueMut<'a, B: Backend = HeapBackend> {
    doc: &'a mut Document<B>,
    place: Place,
}

impl<B: Backend> fmt::Debug for ValueMut<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMut")
            .field("value", &self.load())
            .finish()
    }
}

impl<'a, B: Backend> ValueMut<'a, B> {
    pub(crate) fn new(doc: &'a mut Document<B>, place: Place) -> Self {
        Self { doc, place }
    }

    /// Shorter-lived cursor on the same value
    pub fn reborrow(&mut self) -> ValueMut<'_, B> {
        ValueMut::new(self.doc, self.place)
    }

    /// Read cursor on the same value
    pub fn view(&self) -> ValueRef<'_, B> {
        ValueRef::new(self.doc, self.load())
    }

    /// Give up write access, keeping a read cursor
    pub fn into_view(self) -> ValueRef<'a, B> {
        let value = self.load();
        let doc: &'a Document<B> = self.doc;
        ValueRef::new(doc, value)
    }

    /// Storage discriminant
    pub fn kind(&self) -> Kind {
        self.load().kind()
    }

    /// Elements or members of a container; zero for scalars
    pub fn len(&self) -> usize {
        self.view().len()
    }

    /// Whether a container holds nothing; scalars count as empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the value with a scalar, freeing any previous subtree
    pub fn set<'s>(&mut self, scalar: impl Into<Scalar<'s>>) -> Result<()> {
        let value = self.doc.make_value(scalar.into())?;
        self.doc.replace(self.place, value);
        Ok(())
    }

    pub fn set_null(&mut self) {
        self.doc.replace(self.place, Value::Null);
    }

    /// Become an empty object unless already an object
    pub fn to_object(&mut self) {
        self.become_empty(Kind::Object);
    }

    /// Become an empty array unless already a generic array
    pub fn to_array(&mut self) {
        self.become_empty(Kind::Array);
    }

    pub fn to_bool_array(&mut self) {
        self.become_empty(Kind::BoolArray);
    }

    pub fn to_int_array(&mut self) {
        self.become_empty(Kind::IntArray);
    }

    pub fn to_double_array(&mut self) {
        self.become_empty(Kind::DoubleArray);
    }

    /// Cursor on element `index` of a generic array.
    ///
    /// Null becomes an empty array first, and `index == len` appends a null
    /// element.
    pub fn index(&mut self, index: usize) -> Result<ValueMut<'_, B>> {
        let array = self.array_or_init()?;
        let Value::Array(c) = array else {
            return Err(Error::mismatch("array", array.kind()));
        };
        let len = c.len() as usize;
        if index > len {
            return Err(Error::out_of_range(index, len));
        }
        let c = if index == len {
            let grown = self
                .doc
                .append_element(array, ElementClass::Other, Value::Null)?;
            self.store(grown);
            grown.container().unwrap_or(c)
        } else {
            c
        };
        let slot = c.element(Elem::Value, index as u32);
        Ok(ValueMut::new(self.doc, Place::Slot(slot)))
    }

    /// Cursor on element `index` of a generic array, or on the value of
    /// member `index`
    pub fn get_mut(&mut self, index: usize) -> Result<ValueMut<'_, B>> {
        let value = self.load();
        let slot = match value {
            Value::Array(c) if (index as u64) < u64::from(c.len()) => {
                c.element(Elem::Value, index as u32)
            }
            Value::Object(c) if (index as u64) < u64::from(c.len()) => {
                c.element(Elem::Member, index as u32).add(8)
            }
            Value::Array(c) | Value::Object(c) => {
                return Err(Error::out_of_range(index, c.len() as usize));
            }
            _ => return Err(Error::mismatch("array or object", value.kind())),
        };
        Ok(ValueMut::new(self.doc, Place::Slot(slot)))
    }

    /// Cursor on the value of member `key`, appending a null member if the
    /// key is missing. Null becomes an empty object first.
    pub fn entry<'k>(&mut self, key: impl Into<StrInput<'k>>) -> Result<ValueMut<'_, B>> {
        let key = key.into();
        let c = self.object_or_init()?;
        if let Some(index) = self.view().find_index(key.as_bytes()) {
            let slot = c.element(Elem::Member, index as u32).add(8);
            return Ok(ValueMut::new(self.doc, Place::Slot(slot)));
        }
        let id = self.doc.intern_key(key)?;
        let c = self.push_member(c, id, Value::Null)?;
        let slot = c.element(Elem::Member, c.len() - 1).add(8);
        Ok(ValueMut::new(self.doc, Place::Slot(slot)))
    }

    /// Cursor on the value of member `key`, if present
    pub fn find_mut(&mut self, key: impl AsRef<[u8]>) -> Option<ValueMut<'_, B>> {
        let Value::Object(c) = self.load() else {
            return None;
        };
        let index = self.view().find_index(key)?;
        let slot = c.element(Elem::Member, index as u32).add(8);
        Some(ValueMut::new(self.doc, Place::Slot(slot)))
    }

    /// Append a scalar, specializing or demoting the array as needed.
    /// Null becomes an empty array first.
    pub fn push<'s>(&mut self, scalar: impl Into<Scalar<'s>>) -> Result<()> {
        let scalar = scalar.into();
        let array = self.array_or_init()?;
        let class = scalar.class();
        let item = self.doc.make_value(scalar)?;
        let updated = self.doc.append_element(array, class, item)?;
        self.store(updated);
        Ok(())
    }

    /// Append an empty array and return a cursor on it
    pub fn push_array(&mut self) -> Result<ValueMut<'_, B>> {
        self.push_container(Value::empty_array())
    }

    /// Append an empty object and return a cursor on it
    pub fn push_object(&mut self) -> Result<ValueMut<'_, B>> {
        self.push_container(Value::empty_object())
    }

    /// Append a member without checking for an existing key
    pub fn append_member<'k, 's>(
        &mut self,
        key: impl Into<StrInput<'k>>,
        value: impl Into<Scalar<'s>>,
    ) -> Result<()> {
        let c = self.object_or_init()?;
        let item = self.doc.make_value(value.into())?;
        let id = self.doc.intern_key(key.into())?;
        self.push_member(c, id, item)?;
        Ok(())
    }

    /// Remove the last element or member; `false` if there was none
    pub fn pop(&mut self) -> Result<bool> {
        let (value, mut c, elem) = self.layout("array or object")?;
        if c.is_empty() {
            return Ok(false);
        }
        let last = c.len() - 1;
        self.release_child(c, elem, last);
        c.set_len(last);
        self.store(Value::with_container(value.kind(), c));
        Ok(true)
    }

    /// Remove element or member `index`, shifting later ones down
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let (value, mut c, elem) = self.layout("array or object")?;
        let len = c.len() as usize;
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        let index = index as u32;
        self.release_child(c, elem, index);
        let tail = (c.len() - index - 1) as usize * elem.width();
        self.doc
            .arena
            .copy(c.element(elem, index + 1), c.element(elem, index), tail);
        c.set_len(c.len() - 1);
        self.store(Value::with_container(value.kind(), c));
        Ok(())
    }

    /// Remove every element or member, keeping the capacity
    pub fn clear(&mut self) -> Result<()> {
        let (value, mut c, elem) = self.layout("array or object")?;
        for index in 0..c.len() {
            self.release_child(c, elem, index);
        }
        c.set_len(0);
        self.store(Value::with_container(value.kind(), c));
        Ok(())
    }

    /// Grow the capacity to at least `capacity` in one step
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        let (value, c, elem) = self.layout("array or object")?;
        let capacity = u32::try_from(capacity)
            .map_err(|_| Error::out_of_range(capacity, u32::MAX as usize))?;
        let c = storage::reserve(&mut self.doc.arena, c, elem, capacity)?;
        self.store(Value::with_container(value.kind(), c));
        Ok(())
    }

    /// Fit the capacity to the size, leaving children untouched
    pub fn shrink(&mut self) -> Result<()> {
        let (value, c, elem) = self.layout("array or object")?;
        let c = storage::shrink_to_fit(&mut self.doc.arena, c, elem)?;
        self.store(Value::with_container(value.kind(), c));
        Ok(())
    }

    /// Exchange two elements or members
    pub fn swap_elements(&mut self, a: usize, b: usize) -> Result<()> {
        let (_, c, elem) = self.layout("array or object")?;
        let len = c.len() as usize;
        if a >= len || b >= len {
            return Err(Error::out_of_range(a.max(b), len));
        }
        if a == b {
            return Ok(());
        }
        let width = elem.width();
        let (ha, hb) = (c.element(elem, a as u32), c.element(elem, b as u32));
        let first: SmallVec<[u8; MEMBER_SIZE]> =
            SmallVec::from_slice(self.doc.arena.bytes(ha, width));
        self.doc.arena.copy(hb, ha, width);
        self.doc.arena.bytes_mut(hb, width).copy_from_slice(&first);
        Ok(())
    }

    /// Overwrite element `index` in place.
    ///
    /// Specialized arrays accept only their own scalar type (a double array
    /// also takes integers); generic arrays and objects take anything.
    pub fn set_element<'s>(&mut self, index: usize, scalar: impl Into<Scalar<'s>>) -> Result<()> {
        let (value, c, elem) = self.layout("array or object")?;
        if matches!(elem, Elem::Value | Elem::Member) {
            return self.get_mut(index)?.set(scalar);
        }
        let len = c.len() as usize;
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        let item = self.doc.make_value(scalar.into())?;
        let accepted = matches!(
            (elem, ElementClass::of(&item)),
            (Elem::Bool, ElementClass::Bool)
                | (Elem::Int, ElementClass::Int)
                | (Elem::Double, ElementClass::Double | ElementClass::Int)
        );
        if !accepted {
            let expected = match value.kind() {
                Kind::BoolArray => "bool",
                Kind::IntArray => "int64",
                _ => "double",
            };
            return Err(Error::mismatch(expected, item.kind()));
        }
        let slot = c.element(elem, index as u32);
        value::write_raw(self.doc.arena.bytes_mut(slot, elem.width()), elem, &item);
        Ok(())
    }

    /// Re-key member `index`
    pub fn rename_key<'k>(&mut self, index: usize, key: impl Into<StrInput<'k>>) -> Result<()> {
        let Value::Object(c) = self.load() else {
            return Err(Error::mismatch("object", self.kind()));
        };
        let len = c.len() as usize;
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        let id = self.doc.intern_key(key.into())?;
        let slot = c.element(Elem::Member, index as u32);
        self.doc
            .arena
            .bytes_mut(slot, Handle::ENCODED_SIZE)
            .copy_from_slice(&id.handle().to_bytes());
        Ok(())
    }

    /// Rewrite a bool, int or double array as a generic array with room
    /// for `extra` more elements
    pub fn convert_to_array(&mut self, extra: usize) -> Result<()> {
        let (value, c, elem) = self.layout("array")?;
        let extra = u32::try_from(extra).map_err(|_| Error::out_of_range(extra, u32::MAX as usize))?;
        let c = match value.kind() {
            Kind::BoolArray | Kind::IntArray | Kind::DoubleArray => {
                storage::widen(&mut self.doc.arena, c, elem, extra)?
            }
            Kind::Array => storage::reserve(&mut self.doc.arena, c, elem, c.len() + extra)?,
            kind => return Err(Error::mismatch("array", kind)),
        };
        self.store(Value::Array(c.with_settled(true)));
        Ok(())
    }

    /// Rewrite an int array as a double array with room for `extra` more
    /// elements
    pub fn convert_to_double_array(&mut self, extra: usize) -> Result<()> {
        let (value, c, elem) = self.layout("int array")?;
        let extra = u32::try_from(extra).map_err(|_| Error::out_of_range(extra, u32::MAX as usize))?;
        if !matches!(value.kind(), Kind::IntArray | Kind::DoubleArray) {
            return Err(Error::mismatch("int array", value.kind()));
        }
        let c = storage::reserve(&mut self.doc.arena, c, elem, c.len() + extra)?;
        if value.kind() == Kind::IntArray {
            storage::ints_to_doubles(&mut self.doc.arena, c);
        }
        self.store(Value::DoubleArray(c));
        Ok(())
    }

    fn load(&self) -> Value {
        self.doc.load(self.place)
    }

    fn store(&mut self, value: Value) {
        self.doc.store(self.place, value);
    }

    fn become_empty(&mut self, kind: Kind) {
        if self.kind() != kind {
            self.doc
                .replace(self.place, Value::with_container(kind, Container::EMPTY));
        }
    }

    fn layout(&self, expected: &'static str) -> Result<(Value, Container, Elem)> {
        let value = self.load();
        match (value.container(), value.kind().element()) {
            (Some(c), Some(elem)) => Ok((value, c, elem)),
            _ => Err(Error::mismatch(expected, value.kind())),
        }
    }

    /// The array to append to; null reads as an empty array, stored only
    /// once the append succeeds
    fn array_or_init(&self) -> Result<Value> {
        let value = self.load();
        match value.meta() {
            Meta::Null => Ok(Value::empty_array()),
            Meta::Array => Ok(value),
            _ => Err(Error::mismatch("array", value.kind())),
        }
    }

    fn object_or_init(&self) -> Result<Container> {
        match self.load() {
            Value::Null => Ok(Container::EMPTY),
            Value::Object(c) => Ok(c),
            other => Err(Error::mismatch("object", other.kind())),
        }
    }

    fn push_container(&mut self, item: Value) -> Result<ValueMut<'_, B>> {
        let array = self.array_or_init()?;
        let updated = self.doc.append_element(array, ElementClass::Other, item)?;
        self.store(updated);
        let c = updated.container().unwrap_or_default();
        let slot = c.element(Elem::Value, c.len().saturating_sub(1));
        Ok(ValueMut::new(self.doc, Place::Slot(slot)))
    }

    fn push_member(&mut self, c: Container, key: StrId, value: Value) -> Result<Container> {
        let mut c = storage::grow_for_push(&mut self.doc.arena, c, Elem::Member)?;
        let slot = c.element(Elem::Member, c.len());
        self.doc
            .arena
            .bytes_mut(slot, MEMBER_SIZE)
            .copy_from_slice(&encode_member(key, &value));
        c.set_len(c.len() + 1);
        self.store(Value::Object(c));
        Ok(c)
    }

    fn release_child(&mut self, c: Container, elem: Elem, index: u32) {
        let slot = match elem {
            Elem::Value => c.element(elem, index),
            Elem::Member => c.element(elem, index).add(8),
            Elem::Bool | Elem::Int | Elem::Double => return,
        };
        let child = Value::decode(self.doc.arena.bytes(slot, VALUE_SIZE));
        storage::release(&mut self.doc.arena, child);
    }
}
