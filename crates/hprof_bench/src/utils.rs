//! Benchmark utilities.

use hprof_codec::{BasicType, FieldValue, PrimitiveArray};
use hprof_core::HeapRoot;
use hprof_testkit::SyntheticHeap;
use rand::Rng;

/// Generate a random int array of the specified length.
pub fn random_int_array(len: usize) -> PrimitiveArray {
    let mut rng = rand::thread_rng();
    PrimitiveArray::Int((0..len).map(|_| rng.gen()).collect())
}

/// Generate random identifiers.
pub fn random_ids(count: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen()).collect()
}

/// Build a heap of `instances` objects spread over a small class hierarchy,
/// plus `arrays` int arrays of `array_len` elements.
///
/// Every tenth instance is a JNI global root.
pub fn generate_heap(instances: usize, arrays: usize, array_len: usize) -> SyntheticHeap {
    let mut rng = rand::thread_rng();
    let mut heap = SyntheticHeap::new();
    let object = heap.add_class("java.lang.Object", None, &[]);
    let node = heap.add_class(
        "bench.Node",
        Some(object),
        &[("id", BasicType::Long), ("next", BasicType::Object)],
    );
    let leaf = heap.add_class(
        "bench.Leaf",
        Some(node),
        &[("weight", BasicType::Double), ("flags", BasicType::Int)],
    );
    let int_array = heap.add_class("[I", Some(object), &[]);

    let mut previous = 0u32;
    for n in 0..instances {
        let id = FieldValue::Long(rng.gen());
        let next = FieldValue::Object(previous);
        let object = if n % 2 == 0 {
            heap.add_instance(node, &[id, next])
        } else {
            heap.add_instance(
                leaf,
                &[id, next, FieldValue::Double(rng.gen()), FieldValue::Int(rng.gen())],
            )
        };
        if n % 10 == 0 {
            heap.add_root(HeapRoot::jni_global(object, n as u32));
        }
        previous = object.as_u32();
    }
    for _ in 0..arrays {
        heap.add_primitive_array(int_array, random_int_array(array_len));
    }
    heap
}
