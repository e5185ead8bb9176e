//! Dumps synthetic heaps and reads them back with the conformant reader.

use hprof_codec::{BasicType, FieldValue, HeapId, PrimitiveArray, RecordBuffer, RootKind};
use hprof_core::{FieldOrder, HeapRoot, ObjectId, ObjectModel};
use hprof_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn element_bytes(array: &PrimitiveArray) -> Vec<u8> {
    let mut buf = RecordBuffer::new();
    array.encode_elements(&mut buf).unwrap();
    buf.as_bytes().to_vec()
}

/// Checks every class, instance, array and root of `heap` against `view`.
fn assert_reproduces(heap: &SyntheticHeap, view: &HeapDumpView) {
    for class in heap.class_ids() {
        let id = class.as_u32();
        assert_eq!(view.class_name(id), heap.class_name(class).as_deref());
        let dump = view.class_dump(id).expect("class dump missing");
        assert_eq!(dump.super_id, heap.superclass_of(class).map_or(0, ObjectId::as_u32));
        assert_eq!(dump.instance_size, heap.instance_size(class));
        assert_eq!(dump.fields.len(), heap.instance_fields(class).len());
        assert_eq!(dump.statics.len(), heap.static_fields(class).len());
    }

    for instance in heap.instance_ids() {
        let values: Vec<FieldValue> = view
            .instance_values(instance.as_u32())
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, heap.field_values(instance, FieldOrder::Hierarchical));
    }

    for array in heap.array_ids() {
        if let Some(elements) = heap.object_array_elements(array) {
            let dump = view
                .object_arrays()
                .find(|a| a.id == array.as_u32())
                .expect("object array missing");
            let expected: Vec<u32> = elements.iter().map(|e| e.as_u32()).collect();
            assert_eq!(dump.elements, expected);
        }
        if let Some(contents) = heap.primitive_array_elements(array) {
            let dump = view
                .primitive_arrays()
                .find(|a| a.id == array.as_u32())
                .expect("primitive array missing");
            assert_eq!(dump.element_type, contents.element_type());
            assert_eq!(dump.length as usize, contents.len());
            assert_eq!(dump.data.as_deref(), Some(element_bytes(&contents).as_slice()));
        }
    }

    let written: HashSet<(RootKind, u32)> = view.roots().map(|r| (r.kind, r.object)).collect();
    let expected: HashSet<(RootKind, u32)> = heap
        .roots()
        .iter()
        .map(|r| (r.kind, r.object.as_u32()))
        .collect();
    assert_eq!(written, expected);
}

#[test]
fn class_hierarchy_round_trip() {
    let mut heap = SyntheticHeap::new();
    let object = heap.add_class("java.lang.Object", None, &[]);
    let base = heap.add_class(
        "com.example.Base",
        Some(object),
        &[("id", BasicType::Long), ("next", BasicType::Object)],
    );
    heap.add_static(base, "COUNT", FieldValue::Int(2));
    let derived = heap.add_class(
        "com.example.Derived",
        Some(base),
        &[("flag", BasicType::Boolean), ("ratio", BasicType::Double)],
    );
    let first = heap.add_instance(base, &[FieldValue::Long(1), FieldValue::Object(0)]);
    let second = heap.add_instance(
        derived,
        &[
            FieldValue::Long(2),
            FieldValue::Object(first.as_u32()),
            FieldValue::Boolean(true),
            FieldValue::Double(0.25),
        ],
    );
    heap.add_root(HeapRoot::jni_global(second, 9));

    let view = dump_and_read(&heap, &test_config());
    assert_reproduces(&heap, &view);

    let values = view.instance_values(second.as_u32()).unwrap();
    let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["flag", "ratio", "id", "next"]);
    let statics = &view.class_dump(base.as_u32()).unwrap().statics;
    assert_eq!(statics.len(), 1);
    assert_eq!(view.string(statics[0].0), Some("COUNT"));
    assert_eq!(statics[0].1, FieldValue::Int(2));
}

#[test]
fn flattened_order_lists_every_field() {
    let mut heap = SyntheticHeap::new();
    let base = heap.add_class("Base", None, &[("a", BasicType::Int)]);
    let derived = heap.add_class("Derived", Some(base), &[("b", BasicType::Short)]);
    let obj = heap.add_instance(derived, &[FieldValue::Int(5), FieldValue::Short(6)]);

    let config = test_config().field_order(FieldOrder::Flattened);
    let (_, bytes) = dump_to_memory(&heap, &config);
    let view = HeapDumpView::read(&bytes).unwrap();

    let dump = view.class_dump(derived.as_u32()).unwrap();
    let names: Vec<&str> = dump
        .fields
        .iter()
        .map(|(id, _)| view.string(*id).unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(
        view.instance(obj.as_u32()).unwrap().data,
        vec![0, 0, 0, 5, 0, 6]
    );
}

#[test]
fn arrays_round_trip() {
    let mut heap = SyntheticHeap::new();
    let object = heap.add_class("java.lang.Object", None, &[]);
    let object_array = heap.add_class("[Ljava.lang.Object;", Some(object), &[]);
    let int_array = heap.add_class("[I", Some(object), &[]);
    let char_array = heap.add_class("[C", Some(object), &[]);
    let a = heap.add_instance(object, &[]);
    heap.add_object_array(object_array, &[a, ObjectId::NULL, a]);
    heap.add_primitive_array(int_array, PrimitiveArray::Int(vec![1, -1, i32::MAX]));
    heap.add_primitive_array(char_array, PrimitiveArray::Char(vec![]));

    let view = dump_and_read(&heap, &test_config());
    assert_reproduces(&heap, &view);
    let array = view.object_arrays().next().unwrap();
    assert_eq!(array.class_id, object_array.as_u32());
}

#[test]
fn omitted_primitive_data() {
    let mut heap = SyntheticHeap::new();
    let class = heap.add_class("[J", None, &[]);
    let array = heap.add_primitive_array(class, PrimitiveArray::Long(vec![1, 2, 3]));

    let config = test_config().omit_primitive_array_data(true);
    let (_, bytes) = dump_to_memory(&heap, &config);
    let view = HeapDumpView::read(&bytes).unwrap();

    let dump = view.primitive_arrays().next().unwrap();
    assert_eq!(dump.id, array.as_u32());
    assert_eq!(dump.length, 3);
    assert_eq!(dump.element_type, BasicType::Long);
    assert!(dump.data.is_none());
}

#[test]
fn heap_switches_are_recorded() {
    let mut heap = SyntheticHeap::new();
    let class = heap.add_class("Foo", None, &[]);
    let app = heap.add_instance(class, &[]);
    let zygote = heap.add_instance(class, &[]);
    heap.add_instance(class, &[]);
    heap.set_heap(app, HeapId::App);
    heap.set_heap(zygote, HeapId::Zygote);

    let view = dump_and_read(&heap, &test_config());
    let switches: Vec<(u32, &str)> = view
        .sub_records
        .iter()
        .filter_map(|s| match s {
            SubRecord::HeapInfo { heap, name_id } => Some((*heap, view.string(*name_id).unwrap())),
            _ => None,
        })
        .collect();
    assert_eq!(
        switches,
        vec![
            (HeapId::App.as_u32(), HeapId::App.name()),
            (HeapId::Zygote.as_u32(), HeapId::Zygote.name()),
            (HeapId::Default.as_u32(), HeapId::Default.name()),
        ]
    );
}

#[test]
fn roots_of_every_kind() {
    let mut heap = SyntheticHeap::new();
    let class = heap.add_class("Foo", None, &[]);
    let obj = heap.add_instance(class, &[]);
    for kind in RootKind::ALL {
        heap.add_root(HeapRoot::new(kind, obj).thread(3).frame(1).stack_trace(4));
    }
    heap.add_root(HeapRoot::new(RootKind::JniGlobal, ObjectId::NULL));

    let view = dump_and_read(&heap, &test_config());
    let roots: Vec<_> = view.roots().collect();
    assert_eq!(roots.len(), RootKind::ALL.len());
    for (root, kind) in roots.iter().zip(RootKind::ALL) {
        assert_eq!(root.kind, kind);
        assert_eq!(root.object, obj.as_u32());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn generated_heaps_round_trip(spec in heap_strategy(5, 12)) {
        let heap = spec.build();
        let (summary, bytes) = dump_to_memory(&heap, &test_config());
        let view = HeapDumpView::read(&bytes).unwrap();

        prop_assert!(view.is_complete());
        prop_assert_eq!(summary.objects as usize, heap.object_count());
        assert_reproduces(&heap, &view);
    }
}
