//! # slimjson
//!
//! Arena-backed in-memory JSON documents.
//! Values are 16-byte tagged cells, short strings live inline, homogeneous
//! arrays of bools, integers or doubles are stored as raw payloads, and long
//! strings and object keys are interned in a string pool that several
//! documents may share.
//!
//! ```
//! use slimjson::Document;
//!
//! let mut doc = Document::new();
//! let mut root = doc.root_mut();
//! root.entry("id")?.set(42)?;
//! root.entry("scores")?.push(1.5)?;
//!
//! let view = doc.root();
//! assert_eq!(view.find("id").unwrap().as_i64()?, 42);
//! assert!(view.find("scores").unwrap().is_double_array());
//! # Ok::<(), slimjson::Error>(())
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod alloc;
pub mod builder;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
#[cfg(feature = "serde_json")]
pub mod interop;
pub mod strings;
pub mod value;

// Allocator exports
pub use alloc::{
    Addressing, ArenaStats, Backend, BoundedBackend, Handle, HeapBackend, PoolAllocator,
};

// Document exports
pub use builder::Builder;
pub use document::{Document, Elements, MemberRef, Members, StrView, ValueMut, ValueRef};
pub use events::{EventSink, Flow};

// Value and string exports
pub use strings::{PoolStats, SharedStringPool, StrId, StrInput, StringPool};
pub use value::{Kind, Meta, Scalar, Value};

// Configuration and error exports
pub use config::{ArenaConfig, Config, InternConfig};
pub use error::{Error, Result};

#[cfg(feature = "serde_json")]
pub use interop::{JsonWriter, replay};
