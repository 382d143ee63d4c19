//! Glue between documents and `serde_json::Value`
//!
//! [`replay`] turns a `serde_json::Value` into events for any [`EventSink`];
//! [`JsonWriter`] is a sink collecting events back into a `serde_json::Value`.

use crate::alloc::Backend;
use crate::document::{Document, ValueRef};
use crate::error::{Error, Result};
use crate::events::{EventSink, Flow, forward};
use crate::strings::StrInput;
use serde_json::{Map, Number, Value as JsonValue};
use smallvec::SmallVec;

enum ReplayFrame<'a> {
    Array(std::slice::Iter<'a, JsonValue>, usize),
    Object(serde_json::map::Iter<'a>, usize),
}

/// Emit `json` as events into `sink`
pub fn replay<S: EventSink + ?Sized>(json: &JsonValue, sink: &mut S) -> Result<Flow> {
    let mut frames: SmallVec<[ReplayFrame<'_>; 16]> = SmallVec::new();
    forward!(emit(json, sink, &mut frames));

    while let Some(frame) = frames.last_mut() {
        match frame {
            ReplayFrame::Array(items, count) => match items.next() {
                Some(item) => forward!(emit(item, sink, &mut frames)),
                None => {
                    let count = *count;
                    frames.pop();
                    forward!(sink.end_array(count));
                }
            },
            ReplayFrame::Object(members, count) => match members.next() {
                Some((key, value)) => {
                    forward!(sink.key(StrInput::from(key.as_str())));
                    forward!(emit(value, sink, &mut frames));
                }
                None => {
                    let count = *count;
                    frames.pop();
                    forward!(sink.end_object(count));
                }
            },
        }
    }
    Ok(Flow::Continue)
}

fn emit<'a, S: EventSink + ?Sized>(
    json: &'a JsonValue,
    sink: &mut S,
    frames: &mut SmallVec<[ReplayFrame<'a>; 16]>,
) -> Result<Flow> {
    match json {
        JsonValue::Null => sink.null(),
        JsonValue::Bool(b) => sink.bool(*b),
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                sink.int64(v)
            } else if let Some(v) = n.as_u64() {
                sink.uint64(v)
            } else {
                sink.double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => sink.string(StrInput::from(s.as_str())),
        JsonValue::Array(items) => {
            forward!(sink.begin_array());
            frames.push(ReplayFrame::Array(items.iter(), items.len()));
            Ok(Flow::Continue)
        }
        JsonValue::Object(members) => {
            forward!(sink.begin_object());
            frames.push(ReplayFrame::Object(members.iter(), members.len()));
            Ok(Flow::Continue)
        }
    }
}

enum Partial {
    Array(Vec<JsonValue>),
    Object(Map<String, JsonValue>, Option<String>),
}

/// Event sink collecting one value into a `serde_json::Value`.
///
/// Non-finite doubles become `null`; string content must be UTF-8.
#[derive(Default)]
pub struct JsonWriter {
    stack: Vec<Partial>,
    result: Option<JsonValue>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected value; errors if a container is still open
    pub fn into_value(self) -> Result<JsonValue> {
        if !self.stack.is_empty() {
            return Err(Error::unbalanced(format!(
                "{} containers still open",
                self.stack.len()
            )));
        }
        Ok(self.result.unwrap_or(JsonValue::Null))
    }

    fn value(&mut self, value: JsonValue) -> Result<Flow> {
        match self.stack.last_mut() {
            None if self.result.is_none() => self.result = Some(value),
            None => return Err(Error::unbalanced("second root value")),
            Some(Partial::Array(items)) => items.push(value),
            Some(Partial::Object(members, key)) => match key.take() {
                Some(key) => {
                    members.insert(key, value);
                }
                None => return Err(Error::unbalanced("object value without a key")),
            },
        }
        Ok(Flow::Continue)
    }
}

impl EventSink for JsonWriter {
    fn begin_object(&mut self) -> Result<Flow> {
        self.stack.push(Partial::Object(Map::new(), None));
        Ok(Flow::Continue)
    }

    fn end_object(&mut self, _members: usize) -> Result<Flow> {
        match self.stack.pop() {
            Some(Partial::Object(members, None)) => self.value(JsonValue::Object(members)),
            _ => Err(Error::unbalanced("end_object without an open object")),
        }
    }

    fn begin_array(&mut self) -> Result<Flow> {
        self.stack.push(Partial::Array(Vec::new()));
        Ok(Flow::Continue)
    }

    fn end_array(&mut self, _elements: usize) -> Result<Flow> {
        match self.stack.pop() {
            Some(Partial::Array(items)) => self.value(JsonValue::Array(items)),
            _ => Err(Error::unbalanced("end_array without an open array")),
        }
    }

    fn key(&mut self, key: StrInput<'_>) -> Result<Flow> {
        let key = std::str::from_utf8(key.as_bytes())?.to_owned();
        match self.stack.last_mut() {
            Some(Partial::Object(_, pending @ None)) => {
                *pending = Some(key);
                Ok(Flow::Continue)
            }
            _ => Err(Error::unbalanced("key outside an object")),
        }
    }

    fn null(&mut self) -> Result<Flow> {
        self.value(JsonValue::Null)
    }

    fn bool(&mut self, value: bool) -> Result<Flow> {
        self.value(JsonValue::Bool(value))
    }

    fn int64(&mut self, value: i64) -> Result<Flow> {
        self.value(JsonValue::Number(value.into()))
    }

    fn uint64(&mut self, value: u64) -> Result<Flow> {
        self.value(JsonValue::Number(value.into()))
    }

    fn double(&mut self, value: f64) -> Result<Flow> {
        self.value(Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number))
    }

    fn string(&mut self, value: StrInput<'_>) -> Result<Flow> {
        let content = std::str::from_utf8(value.as_bytes())?.to_owned();
        self.value(JsonValue::String(content))
    }
}

impl Document {
    /// Document holding a copy of `json`
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let mut doc = Document::new();
        doc.load_json(json)?;
        Ok(doc)
    }
}

impl<B: Backend> Document<B> {
    /// Replace the root with a copy of `json`
    pub fn load_json(&mut self, json: &JsonValue) -> Result<()> {
        let mut builder = self.builder();
        replay(json, &mut builder)?;
        builder.finish()
    }

    /// Root value as a `serde_json::Value`
    pub fn to_json(&self) -> Result<JsonValue> {
        self.root().to_json()
    }
}

impl<B: Backend> ValueRef<'_, B> {
    /// This value as a `serde_json::Value`
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut writer = JsonWriter::new();
        self.accept(&mut writer)?;
        writer.into_value()
    }
}
