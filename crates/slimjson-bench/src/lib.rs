//! slimjson benchmarking suite
//!
//! Shared fixtures for the criterion benches.

use serde_json::{Value, json};

pub use slimjson::{Document, Error, Result};

/// Record-shaped document: an array of objects with repeated keys, short
/// and long strings, and a numeric array per record
pub fn records(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("user_{i}"),
                "email": format!("user_{i}@example.com"),
                "active": i % 3 != 0,
                "score": (i as f64) * 0.75,
                "history": (0..8).map(|j| (i * 8 + j) as i64).collect::<Vec<_>>(),
                "tags": ["alpha", "beta", "a somewhat longer shared tag value"],
            })
        })
        .collect();
    Value::Array(items)
}

/// Flat array of numbers; every `double_every`th element is a double
pub fn numbers(count: usize, double_every: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            if double_every > 0 && i % double_every == 0 {
                json!(i as f64 + 0.5)
            } else {
                json!(i as i64)
            }
        })
        .collect();
    Value::Array(items)
}
