//! Incremental document construction from push events
//!
//! The [`Builder`] stages the children of every open container on a scratch
//! stack and copies them into one exactly sized arena block when the
//! container closes. Arrays run the specialization automaton as elements
//! arrive, so a homogeneous array is staged (and committed) as raw payloads.
//!
//! ```
//! use slimjson::{Document, EventSink};
//!
//! let mut doc = Document::new();
//! let mut builder = doc.builder();
//! builder.begin_array()?;
//! builder.int64(1)?;
//! builder.int64(2)?;
//! builder.end_array(2)?;
//! builder.finish()?;
//! drop(builder);
//!
//! assert!(doc.root().is_int_array());
//! # Ok::<(), slimjson::Error>(())
//! ```

mod scratch;

use crate::alloc::{Backend, HeapBackend};
use crate::config::limits::{MEMBER_SIZE, VALUE_SIZE};
use crate::document::{Document, Place};
use crate::error::{Error, Result};
use crate::events::{EventSink, Flow};
use crate::strings::StrInput;
use crate::value::{
    self, ArrayState, Container, Elem, ElementClass, Kind, Scalar, Step, Value, encode_member,
    is_big_capacity,
};
use scratch::ScratchStack;
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Where a container's finished value is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    /// Value cell on the scratch stack
    Scratch(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Object,
    Array(ArrayState),
}

/// One open container
#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    count: u32,
    /// Scratch offset of the first child
    base: usize,
    parent: Parent,
}

impl Frame {
    fn elem(&self) -> Elem {
        match self.kind {
            FrameKind::Object => Elem::Member,
            FrameKind::Array(state) => state.elem(),
        }
    }
}

/// Push-event consumer that assembles a document's root value
///
/// The first event replaces the previous root. Events must be depth
/// balanced; violations are reported as [`Error::Unbalanced`] and leave the
/// builder in an unspecified but safe state until [`Builder::clear`].
pub struct Builder<'a, B: Backend = HeapBackend> {
    doc: &'a mut Document<B>,
    scratch: ScratchStack,
    frames: SmallVec<[Frame; 16]>,
    root_initialized: bool,
    /// Scratch offset of the value cell reserved by the last key
    pending_key: Option<usize>,
}

impl<'a, B: Backend> Builder<'a, B> {
    pub(crate) fn new(doc: &'a mut Document<B>) -> Self {
        Self {
            doc,
            scratch: ScratchStack::new(),
            frames: SmallVec::new(),
            root_initialized: false,
            pending_key: None,
        }
    }

    /// Nesting depth of the container being built
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bytes reserved by the scratch stack
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Check that the event stream was balanced, free the scratch stack and
    /// optionally shrink the document
    pub fn finalize(&mut self, shrink: bool, rehash: bool) -> Result<()> {
        if !self.frames.is_empty() || self.pending_key.is_some() || !self.scratch.is_empty() {
            return Err(Error::unbalanced(format!(
                "finalize with {} open containers",
                self.frames.len()
            )));
        }
        self.scratch.release();
        if shrink {
            self.doc.shrink(rehash)?;
        }
        debug!(
            arena_bytes = self.doc.arena().allocated_bytes(),
            shrink, "builder finalized"
        );
        Ok(())
    }

    /// [`Builder::finalize`] with a shrink pass and no rehash
    pub fn finish(&mut self) -> Result<()> {
        self.finalize(true, false)
    }

    /// Abandon any partially built value and start over.
    ///
    /// A root left incomplete becomes null.
    pub fn clear(&mut self) {
        let partial = !self.frames.is_empty();
        self.discard_staged();
        if partial {
            self.doc.replace(Place::Root, Value::Null);
        }
        self.frames.clear();
        self.scratch.truncate(0);
        self.pending_key = None;
        self.root_initialized = false;
    }

    fn scalar(&mut self, scalar: Scalar<'_>) -> Result<Flow> {
        let class = scalar.class();
        let value = self.doc.make_value(scalar)?;
        self.place(value, class)?;
        Ok(Flow::Continue)
    }

    fn begin(&mut self, kind: Kind) -> Result<Flow> {
        let value = Value::with_container(kind, Container::EMPTY);
        let parent = self
            .place(value, ElementClass::Other)?
            .ok_or_else(|| Error::unbalanced("container staged as raw payload"))?;
        let kind = match kind {
            Kind::Object => FrameKind::Object,
            _ => FrameKind::Array(ArrayState::Unset),
        };
        self.frames.push(Frame {
            kind,
            count: 0,
            base: self.scratch.len(),
            parent,
        });
        Ok(Flow::Continue)
    }

    /// Stage `value` where the next value belongs; returns its cell unless
    /// it went into a specialized array as a raw payload
    fn place(&mut self, value: Value, class: ElementClass) -> Result<Option<Parent>> {
        if !self.root_initialized {
            self.doc.replace(Place::Root, value);
            self.root_initialized = true;
            return Ok(Some(Parent::Root));
        }
        if let Some(offset) = self.pending_key.take() {
            self.scratch
                .bytes_mut(offset, VALUE_SIZE)
                .copy_from_slice(&value.encode());
            return Ok(Some(Parent::Scratch(offset)));
        }

        let int_to_double = self.doc.int_to_double();
        let Some(frame) = self.frames.last_mut() else {
            return Err(Error::unbalanced("value after the root was complete"));
        };
        let FrameKind::Array(state) = frame.kind else {
            return Err(Error::unbalanced("object value without a key"));
        };

        let (next, step) = state.push(class, int_to_double);
        let count = frame.count as usize;
        match step {
            Step::Demote => {
                self.scratch.resize(frame.base + count * VALUE_SIZE);
                let region = self.scratch.bytes_mut(frame.base, count * VALUE_SIZE);
                value::widen_in_place(region, state.elem(), count);
                trace!(count, from = ?state, "staged array demoted");
            }
            Step::IntsToDoubles => {
                let region = self.scratch.bytes_mut(frame.base, count * 8);
                value::ints_to_doubles(region, count);
            }
            Step::Append | Step::AppendAsDouble | Step::Generic => {}
        }
        frame.kind = FrameKind::Array(next);
        frame.count += 1;

        if next.is_specialized() {
            let elem = next.elem();
            let mut raw = [0u8; 8];
            value::write_raw(&mut raw[..elem.width()], elem, &value);
            self.scratch.push(&raw[..elem.width()]);
            Ok(None)
        } else {
            Ok(Some(Parent::Scratch(self.scratch.push(&value.encode()))))
        }
    }

    fn end(&mut self, object: bool, count: usize) -> Result<Flow> {
        let Some(frame) = self.frames.last().copied() else {
            return Err(Error::unbalanced("end event without an open container"));
        };
        if (frame.kind == FrameKind::Object) != object {
            return Err(Error::unbalanced(if object {
                "end_object closing an array"
            } else {
                "end_array closing an object"
            }));
        }
        if self.pending_key.is_some() {
            return Err(Error::unbalanced("key without a value"));
        }
        if count != frame.count as usize {
            return Err(Error::unbalanced(format!(
                "end event reports {count} children, {} were pushed",
                frame.count
            )));
        }

        let elem = frame.elem();
        let bytes = self.scratch.bytes(frame.base, count * elem.width());
        let arena = self.doc.arena_mut();
        let c = if count == 0 {
            Container::EMPTY
        } else if is_big_capacity(frame.count) {
            let block = arena.commit_big(frame.count, bytes)?;
            Container::with_block(block, frame.count, frame.count)
        } else {
            let block = arena.commit(bytes)?;
            Container::with_block(block, frame.count, frame.count)
        };
        let (kind, c) = match frame.kind {
            FrameKind::Object => (Kind::Object, c),
            FrameKind::Array(state) => (state.kind(), c.with_settled(state == ArrayState::Generic)),
        };
        let value = Value::with_container(kind, c);

        self.frames.pop();
        self.scratch.truncate(frame.base);
        match frame.parent {
            Parent::Root => self.doc.store(Place::Root, value),
            Parent::Scratch(offset) => self
                .scratch
                .bytes_mut(offset, VALUE_SIZE)
                .copy_from_slice(&value.encode()),
        }
        Ok(Flow::Continue)
    }

    /// Free containers already committed for children that are still
    /// staged
    fn discard_staged(&mut self) {
        let mut staged: SmallVec<[Value; 16]> = SmallVec::new();
        for frame in &self.frames {
            let (width, skip) = match frame.elem() {
                Elem::Value => (VALUE_SIZE, 0),
                Elem::Member => (MEMBER_SIZE, 8),
                Elem::Bool | Elem::Int | Elem::Double => continue,
            };
            for i in 0..frame.count as usize {
                let offset = frame.base + i * width + skip;
                if offset + VALUE_SIZE <= self.scratch.len() {
                    staged.push(Value::decode(self.scratch.bytes(offset, VALUE_SIZE)));
                }
            }
        }
        for value in staged {
            self.doc.release_value(value);
        }
    }
}

impl<B: Backend> Drop for Builder<'_, B> {
    fn drop(&mut self) {
        if !self.frames.is_empty() {
            self.clear();
        }
    }
}

impl<B: Backend> EventSink for Builder<'_, B> {
    fn begin_object(&mut self) -> Result<Flow> {
        self.begin(Kind::Object)
    }

    fn end_object(&mut self, members: usize) -> Result<Flow> {
        self.end(true, members)
    }

    fn begin_array(&mut self) -> Result<Flow> {
        self.begin(Kind::Array)
    }

    fn end_array(&mut self, elements: usize) -> Result<Flow> {
        self.end(false, elements)
    }

    fn key(&mut self, key: StrInput<'_>) -> Result<Flow> {
        match self.frames.last() {
            Some(frame) if frame.kind == FrameKind::Object => {}
            _ => return Err(Error::unbalanced("key outside an object")),
        }
        if self.pending_key.is_some() {
            return Err(Error::unbalanced("two keys in a row"));
        }
        let id = self.doc.intern_key(key)?;
        let offset = self.scratch.push(&encode_member(id, &Value::Null));
        if let Some(frame) = self.frames.last_mut() {
            frame.count += 1;
        }
        self.pending_key = Some(offset + 8);
        Ok(Flow::Continue)
    }

    fn null(&mut self) -> Result<Flow> {
        self.scalar(Scalar::Null)
    }

    fn bool(&mut self, value: bool) -> Result<Flow> {
        self.scalar(Scalar::Bool(value))
    }

    fn int64(&mut self, value: i64) -> Result<Flow> {
        self.scalar(Scalar::Int64(value))
    }

    fn uint64(&mut self, value: u64) -> Result<Flow> {
        match i64::try_from(value) {
            Ok(value) => self.scalar(Scalar::Int64(value)),
            Err(_) => self.scalar(Scalar::UInt64(value)),
        }
    }

    fn double(&mut self, value: f64) -> Result<Flow> {
        self.scalar(Scalar::Double(value))
    }

    fn string(&mut self, value: StrInput<'_>) -> Result<Flow> {
        self.scalar(Scalar::Str(value))
    }
}
