//! Classes and strings first seen during the heap walk.

use hprof_codec::{BasicType, FieldValue, RecordTag};
use hprof_core::{HeapDumpEngine, SegmentLimits};
use hprof_sink::InMemorySink;
use hprof_testkit::prelude::*;
use std::collections::HashMap;

fn class_dump_counts(view: &HeapDumpView) -> HashMap<u32, usize> {
    let mut counts = HashMap::new();
    for dump in view.class_dumps() {
        *counts.entry(dump.id).or_insert(0) += 1;
    }
    counts
}

fn three_level_heap() -> SyntheticHeap {
    let mut heap = SyntheticHeap::new();
    let object = heap.add_class("java.lang.Object", None, &[]);
    let base = heap.add_class("Base", Some(object), &[("a", BasicType::Int)]);
    let leaf = heap.add_class("Leaf", Some(base), &[("b", BasicType::Char)]);
    heap.add_instance(leaf, &[FieldValue::Int(1), FieldValue::Char(2)]);
    heap.add_instance(base, &[FieldValue::Int(3)]);
    heap
}

#[test]
fn classes_found_during_walk_are_defined_before_use() {
    let heap = three_level_heap().without_class_prescan();
    let view = dump_and_read(&heap, &test_config());

    let tags = view.file.tags();
    let first_segment = tags
        .iter()
        .position(|t| *t == RecordTag::HeapDumpSegment)
        .unwrap();
    let load_classes: Vec<usize> = tags
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == RecordTag::LoadClass)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(load_classes.len(), 3);
    assert!(load_classes.iter().all(|&i| i < first_segment));
    assert!(class_dump_counts(&view).values().all(|&n| n == 1));
}

#[test]
fn hidden_class_objects_are_swept_once() {
    let heap = three_level_heap().without_class_prescan().hide_class_objects();
    let view = dump_and_read(&heap, &test_config());

    let counts = class_dump_counts(&view);
    assert_eq!(counts.len(), heap.class_ids().len());
    assert!(counts.values().all(|&n| n == 1));
    for instance in heap.instance_ids() {
        view.instance_values(instance.as_u32()).unwrap();
    }
}

#[test]
fn late_definitions_precede_their_segment() {
    let heap = three_level_heap().without_class_prescan();
    // one sub-record per segment
    let config = test_config().segments(SegmentLimits::bytes(1));
    let (summary, bytes) = dump_to_memory(&heap, &config);

    assert_eq!(summary.segments, 5);
    // the reader rejects any id used before its definition
    let view = HeapDumpView::read(&bytes).unwrap();
    assert_eq!(view.load_classes.len(), 3);
    let serials: Vec<u32> = view.load_classes.iter().map(|c| c.serial).collect();
    assert_eq!(serials, vec![1, 2, 3]);
}

#[test]
fn revisiting_a_class_writes_nothing() {
    let mut heap = SyntheticHeap::new();
    let class = heap.add_class("Foo", None, &[]);
    let sink = InMemorySink::new();
    let reader = sink.clone();

    let mut engine = HeapDumpEngine::open_with_sink(&test_config(), &heap, Box::new(sink)).unwrap();
    engine.start_heap_dump().unwrap();
    engine.dump_object(class).unwrap();
    engine.dump_object(class).unwrap();
    let summary = engine.finish().unwrap();
    drop(engine);

    assert_eq!(summary.objects, 1);
    let view = HeapDumpView::read(&reader.data()).unwrap();
    assert_eq!(view.class_dumps().count(), 1);
}

#[test]
fn interning_is_stable_across_sections() {
    let mut heap = SyntheticHeap::new();
    let class = heap.add_class("Foo", None, &[("Foo", BasicType::Int)]);
    let sink = InMemorySink::new();
    let reader = sink.clone();

    let mut engine = HeapDumpEngine::open_with_sink(&test_config(), &heap, Box::new(sink)).unwrap();
    let early = engine.intern_string("Foo").unwrap();
    engine.register_class(class).unwrap();
    engine.start_heap_dump().unwrap();
    let late = engine.intern_string("Foo").unwrap();
    assert_eq!(early, late);
    engine.finish().unwrap();
    drop(engine);

    let view = HeapDumpView::read(&reader.data()).unwrap();
    assert_eq!(view.strings.len(), 1);
    let string_records = view
        .file
        .records
        .iter()
        .filter(|r| r.tag == RecordTag::String)
        .count();
    assert_eq!(string_records, 1);
}
