//! Documents: one root value over an arena and a string pool
//!
//! A [`Document`] owns the arena holding every container block and shares
//! a [`StringPool`] (possibly with other documents) for long strings and
//! keys. Values are reached through cursors: [`ValueRef`] for reading and
//! [`ValueMut`] for mutation.
//!
//! # Cursor validity
//!
//! Cursors address cells by arena handle. Growing, converting or removing a
//! container moves its elements, so any cursor into that container's subtree
//! goes stale. The borrow checker prevents using a cursor across such a
//! mutation of the same document; cursors must be re-derived afterwards.

mod cursor;
mod storage;

pub use cursor::{Elements, MemberRef, Members, StrView, ValueMut, ValueRef};

use crate::alloc::{Backend, Handle, HeapBackend, PoolAllocator};
use crate::builder::Builder;
use crate::config::Config;
use crate::config::limits::{MAX_STRING_LEN, VALUE_SIZE};
use crate::error::{Error, Result};
use crate::strings::{SharedStringPool, StrId, StrInput, StringPool};
use crate::value::{
    ArrayState, ElementClass, LongString, Scalar, ShortString, Step, Value, write_raw,
};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Location of a value cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Place {
    Root,
    Slot(Handle),
}

/// In-memory JSON document
#[derive(Debug)]
pub struct Document<B: Backend = HeapBackend> {
    root: Value,
    arena: PoolAllocator<B>,
    strings: SharedStringPool<B>,
    int_to_double: bool,
}

impl Default for Document<HeapBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl Document<HeapBackend> {
    /// Empty document with its own string pool
    pub fn new() -> Self {
        let backend = HeapBackend::new();
        let config = Config::default();
        let strings = Rc::new(RefCell::new(StringPool::build(
            backend.clone(),
            config.strings,
        )));
        Self::from_parts(backend, config, strings)
    }

    /// Empty document using `config`
    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_backend(HeapBackend::new(), config)
    }

    /// Fresh string pool suitable for [`Document::with_shared_pool`]
    pub fn make_shared_string_pool() -> SharedStringPool<HeapBackend> {
        Rc::new(RefCell::new(StringPool::default()))
    }
}

impl<B: Backend> Document<B> {
    /// Empty document drawing all memory from `backend`
    pub fn with_backend(backend: B, config: Config) -> Result<Self> {
        config.validate()?;
        let strings = StringPool::shared(backend.clone(), config.strings)?;
        Ok(Self::from_parts(backend, config, strings))
    }

    /// Empty document interning into an existing pool; the arena uses a
    /// clone of the pool's backend
    pub fn with_shared_pool(pool: &SharedStringPool<B>) -> Result<Self> {
        Self::with_shared_pool_and_config(pool, Config::default())
    }

    /// [`Document::with_shared_pool`] with explicit arena settings; the
    /// string section of `config` is ignored
    pub fn with_shared_pool_and_config(pool: &SharedStringPool<B>, config: Config) -> Result<Self> {
        config.validate()?;
        let backend = pool.try_borrow()?.backend().clone();
        Ok(Self::from_parts(backend, config, Rc::clone(pool)))
    }

    fn from_parts(backend: B, config: Config, strings: SharedStringPool<B>) -> Self {
        Self {
            root: Value::Null,
            arena: PoolAllocator::compacting(backend, config.arena),
            strings,
            int_to_double: config.int_to_double,
        }
    }

    /// Read cursor on the root value
    pub fn root(&self) -> ValueRef<'_, B> {
        ValueRef::new(self, self.root)
    }

    /// Write cursor on the root value
    pub fn root_mut(&mut self) -> ValueMut<'_, B> {
        ValueMut::new(self, Place::Root)
    }

    /// Incremental builder replacing the root value
    pub fn builder(&mut self) -> Builder<'_, B> {
        Builder::new(self)
    }

    /// Container arena
    pub fn arena(&self) -> &PoolAllocator<B> {
        &self.arena
    }

    /// String pool, possibly shared with other documents
    pub fn string_pool(&self) -> &SharedStringPool<B> {
        &self.strings
    }

    /// Whether int arrays widen to double arrays on a mixed push
    pub fn int_to_double(&self) -> bool {
        self.int_to_double
    }

    /// Change the mixed-number policy for subsequent pushes
    pub fn set_int_to_double(&mut self, enabled: bool) {
        self.int_to_double = enabled;
    }

    /// Drop every value and, unless the pool is shared, every string
    pub fn clear(&mut self) -> Result<()> {
        self.clear_objects();
        self.clear_strings()
    }

    /// Drop every value; chunk buffers stay allocated until [`Document::shrink`]
    pub fn clear_objects(&mut self) {
        self.root = Value::Null;
        self.arena.clear();
        debug!("cleared document values");
    }

    /// Clear the string pool; a pool shared with other documents is left
    /// alone
    pub fn clear_strings(&mut self) -> Result<()> {
        if Rc::strong_count(&self.strings) > 1 {
            warn!(
                owners = Rc::strong_count(&self.strings),
                "string pool is shared, not clearing it"
            );
            return Ok(());
        }
        self.strings.try_borrow_mut()?.clear();
        Ok(())
    }

    /// Fit every container to its size, then return unused arena and
    /// pool memory
    pub fn shrink(&mut self, rehash: bool) -> Result<()> {
        let mut pending: SmallVec<[Place; 16]> = SmallVec::new();
        pending.push(Place::Root);
        let mut containers = 0usize;
        while let Some(place) = pending.pop() {
            let value = self.load(place);
            let (Some(c), Some(elem)) = (value.container(), value.kind().element()) else {
                continue;
            };
            let c = storage::shrink_to_fit(&mut self.arena, c, elem)?;
            let value = Value::with_container(value.kind(), c);
            self.store(place, value);
            containers += 1;
            pending.extend(storage::child_slots(&value).into_iter().map(Place::Slot));
        }
        self.arena.shrink();
        self.strings.try_borrow_mut()?.shrink(rehash)?;
        debug!(
            containers,
            arena_bytes = self.arena.allocated_bytes(),
            "shrunk document"
        );
        Ok(())
    }

    pub(crate) fn load(&self, place: Place) -> Value {
        match place {
            Place::Root => self.root,
            Place::Slot(slot) => Value::decode(self.arena.bytes(slot, VALUE_SIZE)),
        }
    }

    pub(crate) fn store(&mut self, place: Place, value: Value) {
        match place {
            Place::Root => self.root = value,
            Place::Slot(slot) => self
                .arena
                .bytes_mut(slot, VALUE_SIZE)
                .copy_from_slice(&value.encode()),
        }
    }

    pub(crate) fn arena_mut(&mut self) -> &mut PoolAllocator<B> {
        &mut self.arena
    }

    /// Free the containers below `value`
    pub(crate) fn release_value(&mut self, value: Value) {
        storage::release(&mut self.arena, value);
    }

    /// Replace the value at `place`, freeing the old subtree
    pub(crate) fn replace(&mut self, place: Place, value: Value) {
        let old = self.load(place);
        storage::release(&mut self.arena, old);
        self.store(place, value);
    }

    /// Turn a scalar into a cell value, interning long strings
    pub(crate) fn make_value(&mut self, scalar: Scalar<'_>) -> Result<Value> {
        Ok(match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int64(v) => Value::Int64(v),
            Scalar::UInt64(v) => Value::UInt64(v),
            Scalar::Double(v) => Value::Double(v),
            Scalar::Str(input) => match ShortString::new(input.as_bytes()) {
                Some(short) => Value::ShortString(short),
                None => {
                    let len = string_len(input.len())?;
                    let (id, _) = self.strings.try_borrow_mut()?.provide(input, false)?;
                    Value::LongString(LongString { id, len })
                }
            },
        })
    }

    pub(crate) fn intern_key(&mut self, key: StrInput<'_>) -> Result<StrId> {
        Ok(self.strings.try_borrow_mut()?.provide(key, true)?.0)
    }

    /// Append `item` to the array `array`, running the specialization
    /// automaton; returns the updated array value
    pub(crate) fn append_element(
        &mut self,
        array: Value,
        class: ElementClass,
        item: Value,
    ) -> Result<Value> {
        let kind = array.kind();
        let Some((c, state)) = array
            .container()
            .and_then(|c| Some((c, ArrayState::of(kind, c.is_settled() || !c.is_empty())?)))
        else {
            return Err(Error::mismatch("array", kind));
        };

        let (next, step) = state.push(class, self.int_to_double);
        let elem = next.elem();
        let mut c = match step {
            Step::Demote => storage::widen(&mut self.arena, c, state.elem(), 1)?,
            // reserved but never used; the block still has the generic width
            _ if state == ArrayState::Unset && next.is_specialized() && !c.block().is_none() => {
                storage::relayout(&mut self.arena, c, state.elem(), elem)?
            }
            _ => storage::grow_for_push(&mut self.arena, c, elem)?,
        };
        if next == ArrayState::Generic {
            c = c.with_settled(true);
        }
        if step == Step::IntsToDoubles {
            storage::ints_to_doubles(&mut self.arena, c);
        }

        let slot = c.element(elem, c.len());
        let cell = self.arena.bytes_mut(slot, elem.width());
        if next.is_specialized() {
            write_raw(cell, elem, &item);
        } else {
            cell.copy_from_slice(&item.encode());
        }
        c.set_len(c.len() + 1);
        Ok(Value::with_container(next.kind(), c))
    }
}

/// Length field of a long string
fn string_len(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(short) if len <= MAX_STRING_LEN => Ok(short),
        _ => Err(Error::StringTooLong(len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Kind;

    #[test]
    fn test_string_len_is_checked() {
        assert_eq!(string_len(15).unwrap(), 15);
        assert_eq!(string_len(MAX_STRING_LEN).unwrap(), MAX_STRING_LEN as u32);
        assert_eq!(string_len(MAX_STRING_LEN + 1), Err(Error::StringTooLong(MAX_STRING_LEN + 1)));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(string_len(1 << 32), Err(Error::StringTooLong(1 << 32)));
    }

    #[test]
    fn test_new_document_is_null() {
        let doc = Document::new();
        assert!(doc.root().is_null());
        assert_eq!(doc.arena().allocated_bytes(), 0);
        assert!(doc.int_to_double());
    }

    #[test]
    fn test_make_value_inlines_short_strings() {
        let mut doc = Document::new();
        let short = doc.make_value(Scalar::from("fourteen chars")).unwrap();
        assert_eq!(short.kind(), Kind::ShortString);
        let long = doc.make_value(Scalar::from("fifteen chars!!")).unwrap();
        assert_eq!(long.kind(), Kind::LongString);
        assert_eq!(doc.string_pool().borrow().len(), 1);
    }

    #[test]
    fn test_append_element_specializes() {
        let mut doc = Document::new();
        let mut array = Value::empty_array();
        for v in 0..3 {
            array = doc
                .append_element(array, ElementClass::Int, Value::Int64(v))
                .unwrap();
        }
        assert_eq!(array.kind(), Kind::IntArray);

        array = doc
            .append_element(array, ElementClass::Double, Value::Double(0.5))
            .unwrap();
        assert_eq!(array.kind(), Kind::DoubleArray);

        array = doc
            .append_element(array, ElementClass::Other, Value::Null)
            .unwrap();
        assert_eq!(array.kind(), Kind::Array);
        assert_eq!(array.container().unwrap().len(), 5);
    }

    #[test]
    fn test_append_element_rejects_non_arrays() {
        let mut doc = Document::new();
        let err = doc
            .append_element(Value::empty_object(), ElementClass::Int, Value::Int64(1))
            .unwrap_err();
        assert_eq!(err, Error::mismatch("array", Kind::Object));
    }

    #[test]
    fn test_shared_pool_clear_is_skipped() {
        let pool = Document::make_shared_string_pool();
        let mut a = Document::with_shared_pool(&pool).unwrap();
        let b = Document::with_shared_pool(&pool).unwrap();
        a.root_mut().set("a string long enough to intern").unwrap();
        a.clear().unwrap();
        assert_eq!(pool.borrow().len(), 1);
        drop(b);
        drop(pool);
        a.clear().unwrap();
        assert_eq!(a.string_pool().borrow().len(), 0);
    }
}
