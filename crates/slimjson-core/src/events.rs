//! Push-event interface
//!
//! The same event vocabulary flows in both directions: an external tokenizer
//! drives a [`Builder`](crate::Builder) through [`EventSink`], and a
//! finished value is replayed into any sink with
//! [`ValueRef::accept`](crate::ValueRef::accept).

use crate::error::Result;
use crate::strings::StrInput;

/// Whether the event source should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Continue,
    Abort,
}

impl Flow {
    /// Whether the source should stop
    #[inline]
    pub fn is_abort(self) -> bool {
        self == Flow::Abort
    }
}

/// Consumer of a depth-balanced JSON event stream
///
/// End events carry the number of members or elements of the container
/// being closed. Object members arrive as a [`EventSink::key`] event followed
/// by exactly one value (scalar or container).
pub trait EventSink {
    fn begin_object(&mut self) -> Result<Flow>;
    fn end_object(&mut self, members: usize) -> Result<Flow>;
    fn begin_array(&mut self) -> Result<Flow>;
    fn end_array(&mut self, elements: usize) -> Result<Flow>;
    fn key(&mut self, key: StrInput<'_>) -> Result<Flow>;
    fn null(&mut self) -> Result<Flow>;
    fn bool(&mut self, value: bool) -> Result<Flow>;
    fn int64(&mut self, value: i64) -> Result<Flow>;
    fn uint64(&mut self, value: u64) -> Result<Flow>;
    fn double(&mut self, value: f64) -> Result<Flow>;
    fn string(&mut self, value: StrInput<'_>) -> Result<Flow>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn begin_object(&mut self) -> Result<Flow> {
        (**self).begin_object()
    }

    fn end_object(&mut self, members: usize) -> Result<Flow> {
        (**self).end_object(members)
    }

    fn begin_array(&mut self) -> Result<Flow> {
        (**self).begin_array()
    }

    fn end_array(&mut self, elements: usize) -> Result<Flow> {
        (**self).end_array(elements)
    }

    fn key(&mut self, key: StrInput<'_>) -> Result<Flow> {
        (**self).key(key)
    }

    fn null(&mut self) -> Result<Flow> {
        (**self).null()
    }

    fn bool(&mut self, value: bool) -> Result<Flow> {
        (**self).bool(value)
    }

    fn int64(&mut self, value: i64) -> Result<Flow> {
        (**self).int64(value)
    }

    fn uint64(&mut self, value: u64) -> Result<Flow> {
        (**self).uint64(value)
    }

    fn double(&mut self, value: f64) -> Result<Flow> {
        (**self).double(value)
    }

    fn string(&mut self, value: StrInput<'_>) -> Result<Flow> {
        (**self).string(value)
    }
}

/// Return early from the enclosing function when a sink asks to abort
macro_rules! forward {
    ($event:expr) => {
        if $event?.is_abort() {
            return Ok($crate::events::Flow::Abort);
        }
    };
}

pub(crate) use forward;
