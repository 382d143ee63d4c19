//! Comprehensive tests for the incremental builder
//!
//! Covers:
//! - Object and array assembly with exact capacities
//! - On-the-fly specialization, widening and demotion while staging
//! - Big-layout commits
//! - Unbalanced event detection and recovery
//! - Shrink and rehash on finalize

use slimjson::{
    BoundedBackend, Config, Document, Error, EventSink, Flow, HeapBackend, Kind, StrInput, Value,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_object_members_committed_exactly() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_object().unwrap();
    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        b.key(key.into()).unwrap();
        b.int64(i as i64).unwrap();
    }
    b.end_object(3).unwrap();
    b.finalize(false, false).unwrap();
    drop(b);

    let root = doc.root();
    assert_eq!(root.kind(), Kind::Object);
    assert_eq!(root.len(), 3);
    assert_eq!(root.capacity(), 3);
    assert_eq!(root.mem_size(), 3 * 24);
    assert_eq!(root.key_at(2).unwrap(), "c");
    assert_eq!(root.find("b").unwrap().as_i64().unwrap(), 1);
}

#[test]
fn test_empty_containers() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    b.begin_object().unwrap();
    b.end_object(0).unwrap();
    b.begin_array().unwrap();
    b.end_array(0).unwrap();
    b.end_array(2).unwrap();
    b.finish().unwrap();
    drop(b);

    let root = doc.root();
    assert_eq!(root.kind(), Kind::Array);
    assert!(root.get(0).unwrap().is_object());
    assert!(root.get(0).unwrap().is_empty());
    assert_eq!(root.get(1).unwrap().kind(), Kind::Array);
    assert_eq!(root.get(1).unwrap().mem_size(), 0);
}

#[test]
fn test_int_array_widens_when_double_arrives() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    for v in [1, 2, 3] {
        b.int64(v).unwrap();
    }
    b.double(0.5).unwrap();
    b.int64(7).unwrap();
    b.end_array(5).unwrap();
    b.finish().unwrap();
    drop(b);

    let root = doc.root();
    assert_eq!(root.kind(), Kind::DoubleArray);
    let values: Vec<f64> = root.iter().map(|v| v.as_f64().unwrap()).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 0.5, 7.0]);
    assert_eq!(root.mem_size(), 5 * 8);
}

#[test]
fn test_demotion_rewrites_staged_payloads() {
    init_tracing();
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_object().unwrap();
    b.key("values".into()).unwrap();
    b.begin_array().unwrap();
    for v in 0..10 {
        b.int64(v).unwrap();
    }
    b.string("a string long enough for the pool".into()).unwrap();
    b.int64(10).unwrap();
    b.end_array(12).unwrap();
    b.key("after".into()).unwrap();
    b.bool(true).unwrap();
    b.end_object(2).unwrap();
    b.finish().unwrap();
    drop(b);

    let root = doc.root();
    let values = root.find("values").unwrap();
    assert_eq!(values.kind(), Kind::Array);
    assert_eq!(values.len(), 12);
    for i in 0..10 {
        assert_eq!(values.get(i).unwrap().value(), Value::Int64(i as i64));
    }
    assert!(values.get(10).unwrap().is_long_string());
    assert_eq!(values.get(11).unwrap().as_i64().unwrap(), 10);
    assert!(root.find("after").unwrap().as_bool().unwrap());
}

#[test]
fn test_bool_array_demotes_on_container() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    b.bool(false).unwrap();
    b.bool(true).unwrap();
    b.bool(false).unwrap();
    b.begin_array().unwrap();
    b.double(1.25).unwrap();
    b.end_array(1).unwrap();
    b.end_array(4).unwrap();
    b.finish().unwrap();
    drop(b);

    let root = doc.root();
    assert_eq!(root.kind(), Kind::Array);
    assert!(root.get(1).unwrap().as_bool().unwrap());
    let inner = root.get(3).unwrap();
    assert!(inner.is_double_array());
    assert_eq!(inner.get(0).unwrap().as_f64().unwrap(), 1.25);
}

#[test]
fn test_deep_nesting() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    for _ in 0..100 {
        b.begin_array().unwrap();
    }
    b.null().unwrap();
    b.end_array(1).unwrap();
    for _ in 0..99 {
        b.end_array(1).unwrap();
    }
    b.finish().unwrap();
    drop(b);

    let mut depth = 0;
    let mut cursor = doc.root();
    while cursor.is_array() {
        depth += 1;
        cursor = cursor.get(0).unwrap();
    }
    assert_eq!(depth, 100);
    assert!(cursor.is_null());
}

#[test]
fn test_big_object_commit() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_object().unwrap();
    for i in 0..65_535 {
        b.key(format!("k{i}").as_str().into()).unwrap();
        b.int64(i).unwrap();
    }
    b.end_object(65_535).unwrap();
    b.finish().unwrap();
    drop(b);

    let root = doc.root();
    assert!(root.is_big());
    assert_eq!(root.len(), 65_535);
    assert_eq!(root.find("k65534").unwrap().as_i64().unwrap(), 65_534);
}

#[test]
fn test_array_just_below_threshold_stays_small() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    for _ in 0..65_534 {
        b.null().unwrap();
    }
    b.end_array(65_534).unwrap();
    b.finish().unwrap();
    drop(b);
    assert!(!doc.root().is_big());
    assert_eq!(doc.root().capacity(), 65_534);
}

#[test]
fn test_scratch_is_released_by_finalize() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    for i in 0..1000 {
        b.int64(i).unwrap();
    }
    assert!(b.scratch_capacity() >= 8000);
    b.end_array(1000).unwrap();
    b.finish().unwrap();
    assert_eq!(b.scratch_capacity(), 0);
}

#[test]
fn test_unbalanced_finalize_reports_error() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_object().unwrap();
    b.key("open".into()).unwrap();
    let err = b.finalize(true, true).unwrap_err();
    assert!(matches!(err, Error::Unbalanced(_)));
    assert_eq!(b.depth(), 1);
}

#[test]
fn test_key_errors() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    assert!(matches!(b.key("k".into()), Err(Error::Unbalanced(_))));
    b.end_array(0).unwrap();
    drop(b);

    let mut b = doc.builder();
    b.begin_object().unwrap();
    b.key("a".into()).unwrap();
    assert!(matches!(b.key("b".into()), Err(Error::Unbalanced(_))));
    assert!(matches!(b.end_object(1), Err(Error::Unbalanced(_))));
}

#[test]
fn test_dropping_builder_mid_stream_frees_staged_blocks() {
    init_tracing();
    let mut doc = Document::new();
    {
        let mut b = doc.builder();
        b.begin_array().unwrap();
        for _ in 0..10 {
            b.begin_object().unwrap();
            b.key("x".into()).unwrap();
            b.int64(1).unwrap();
            b.end_object(1).unwrap();
        }
    }
    assert!(doc.root().is_null());
    assert_eq!(doc.arena().allocated_bytes(), 0);
}

#[test]
fn test_rebuild_after_clear() {
    let mut doc = Document::new();
    let mut b = doc.builder();
    b.begin_object().unwrap();
    b.clear();
    b.int64(5).unwrap();
    b.finish().unwrap();
    drop(b);
    assert_eq!(doc.root().as_i64().unwrap(), 5);
}

#[test]
fn test_shared_string_input() {
    let mut doc = Document::new();
    let shared = bytes::Bytes::from_static(b"externally owned string content");
    let mut b = doc.builder();
    b.begin_array().unwrap();
    b.string(StrInput::Shared(shared.clone())).unwrap();
    b.string(StrInput::from("externally owned string content"))
        .unwrap();
    b.end_array(2).unwrap();
    b.finish().unwrap();
    drop(b);

    assert_eq!(doc.string_pool().borrow().len(), 1);
    let root = doc.root();
    assert_eq!(root.get(0).unwrap().value(), root.get(1).unwrap().value());
}

#[test]
fn test_exhaustion_during_commit() {
    let backend = BoundedBackend::new(2048);
    let config = Config {
        arena: slimjson::ArenaConfig::with_chunk_size(512),
        ..Config::default()
    };
    let mut doc = Document::with_backend(backend, config).unwrap();
    let mut b = doc.builder();
    b.begin_array().unwrap();
    for _ in 0..500 {
        b.null().unwrap();
    }
    let err = b.end_array(500).unwrap_err();
    assert!(err.is_exhaustion());
}

#[test]
fn test_finish_shrinks_document() {
    let backend = HeapBackend::new();
    let mut doc = Document::with_backend(backend.clone(), Config::default()).unwrap();
    doc.root_mut().push("discarded").unwrap();
    let mut b = doc.builder();
    assert_eq!(b.bool(true).unwrap(), Flow::Continue);
    b.finalize(true, true).unwrap();
    drop(b);
    assert_eq!(doc.arena().chunk_count(), 0);
}
