//! Property-based test generators using proptest.
//!
//! Strategies produce heap shapes rather than raw bytes; [`HeapSpec::build`]
//! turns a shape into a [`SyntheticHeap`]. Generated float values are
//! finite so decoded values compare equal.

use crate::synthetic::SyntheticHeap;
use hprof_codec::{BasicType, FieldValue, PrimitiveArray, RootKind};
use hprof_core::{HeapRoot, ObjectId};
use proptest::prelude::*;

/// Every basic type.
pub const ALL_BASIC_TYPES: [BasicType; 9] = [
    BasicType::Object,
    BasicType::Boolean,
    BasicType::Char,
    BasicType::Float,
    BasicType::Double,
    BasicType::Byte,
    BasicType::Short,
    BasicType::Int,
    BasicType::Long,
];

/// Strategy for any basic type.
pub fn basic_type_strategy() -> impl Strategy<Value = BasicType> {
    prop::sample::select(ALL_BASIC_TYPES.to_vec())
}

/// Strategy for primitive basic types.
pub fn primitive_type_strategy() -> impl Strategy<Value = BasicType> {
    prop::sample::select(ALL_BASIC_TYPES[1..].to_vec())
}

/// Deterministic value of `ty` derived from `seed`.
///
/// Object values are null so they never reference missing objects.
pub fn value_from_seed(ty: BasicType, seed: u64) -> FieldValue {
    match ty {
        BasicType::Object => FieldValue::Object(0),
        BasicType::Boolean => FieldValue::Boolean(seed & 1 == 1),
        BasicType::Char => FieldValue::Char(seed as u16),
        BasicType::Float => FieldValue::Float((seed % 1_000_000) as f32 / 8.0),
        BasicType::Double => FieldValue::Double((seed % 1_000_000_000) as f64 / 16.0),
        BasicType::Byte => FieldValue::Byte(seed as i8),
        BasicType::Short => FieldValue::Short(seed as i16),
        BasicType::Int => FieldValue::Int(seed as i32),
        BasicType::Long => FieldValue::Long(seed as i64),
    }
}

/// Strategy for primitive array contents of up to `max_len` elements.
pub fn primitive_array_strategy(max_len: usize) -> impl Strategy<Value = PrimitiveArray> {
    let finite_f32 = (-1.0e6f32..1.0e6f32).prop_filter("finite", |v| v.is_finite());
    let finite_f64 = (-1.0e12f64..1.0e12f64).prop_filter("finite", |v| v.is_finite());
    prop_oneof![
        prop::collection::vec(any::<bool>(), 0..max_len).prop_map(PrimitiveArray::Boolean),
        prop::collection::vec(any::<u16>(), 0..max_len).prop_map(PrimitiveArray::Char),
        prop::collection::vec(finite_f32, 0..max_len).prop_map(PrimitiveArray::Float),
        prop::collection::vec(finite_f64, 0..max_len).prop_map(PrimitiveArray::Double),
        prop::collection::vec(any::<i8>(), 0..max_len).prop_map(PrimitiveArray::Byte),
        prop::collection::vec(any::<i16>(), 0..max_len).prop_map(PrimitiveArray::Short),
        prop::collection::vec(any::<i32>(), 0..max_len).prop_map(PrimitiveArray::Int),
        prop::collection::vec(any::<i64>(), 0..max_len).prop_map(PrimitiveArray::Long),
    ]
}

/// Shape of one generated class.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    /// Index of the superclass among earlier classes.
    pub superclass: Option<usize>,
    /// Declared instance field types.
    pub fields: Vec<BasicType>,
    /// Static field types.
    pub statics: Vec<BasicType>,
}

/// Shape of a generated heap.
#[derive(Debug, Clone)]
pub struct HeapSpec {
    /// Classes; superclasses always precede subclasses.
    pub classes: Vec<ClassSpec>,
    /// Instances as (class index, value seed).
    pub instances: Vec<(usize, u64)>,
    /// Primitive arrays.
    pub primitive_arrays: Vec<PrimitiveArray>,
    /// Object arrays as instance indices.
    pub object_arrays: Vec<Vec<usize>>,
    /// Number of instances reported as JNI global roots.
    pub roots: usize,
}

fn class_spec_strategy(index: usize) -> impl Strategy<Value = ClassSpec> {
    let superclass = if index == 0 {
        Just(None).boxed()
    } else {
        prop::option::of(0..index).boxed()
    };
    (
        superclass,
        prop::collection::vec(basic_type_strategy(), 0..6),
        prop::collection::vec(basic_type_strategy(), 0..3),
    )
        .prop_map(|(superclass, fields, statics)| ClassSpec {
            superclass,
            fields,
            statics,
        })
}

/// Strategy for heaps with up to `max_classes` classes and
/// `max_instances` instances.
pub fn heap_strategy(max_classes: usize, max_instances: usize) -> impl Strategy<Value = HeapSpec> {
    (1..=max_classes.max(1))
        .prop_flat_map(move |n| {
            let classes: Vec<_> = (0..n).map(class_spec_strategy).collect();
            (
                classes,
                prop::collection::vec((0..n, any::<u64>()), 0..=max_instances),
                prop::collection::vec(primitive_array_strategy(16), 0..4),
            )
        })
        .prop_flat_map(|(classes, instances, primitive_arrays)| {
            let count = instances.len();
            let object_arrays = if count == 0 {
                Just(Vec::new()).boxed()
            } else {
                prop::collection::vec(prop::collection::vec(0..count, 0..8), 0..3).boxed()
            };
            (
                Just(classes),
                Just(instances),
                Just(primitive_arrays),
                object_arrays,
                0..=count,
            )
        })
        .prop_map(
            |(classes, instances, primitive_arrays, object_arrays, roots)| HeapSpec {
                classes,
                instances,
                primitive_arrays,
                object_arrays,
                roots,
            },
        )
}

impl HeapSpec {
    /// Builds the described heap.
    pub fn build(&self) -> SyntheticHeap {
        let mut heap = SyntheticHeap::new();
        let root = heap.add_class("java.lang.Object", None, &[]);

        let mut classes: Vec<ObjectId> = Vec::with_capacity(self.classes.len());
        let mut layouts: Vec<Vec<BasicType>> = Vec::with_capacity(self.classes.len());
        for (i, spec) in self.classes.iter().enumerate() {
            let names: Vec<String> = (0..spec.fields.len()).map(|f| format!("f{i}_{f}")).collect();
            let fields: Vec<(&str, BasicType)> = names
                .iter()
                .map(String::as_str)
                .zip(spec.fields.iter().copied())
                .collect();
            let superclass = spec.superclass.map_or(root, |s| classes[s]);
            let class = heap.add_class(&format!("gen.Class{i}"), Some(superclass), &fields);
            for (s, ty) in spec.statics.iter().enumerate() {
                heap.add_static(class, &format!("s{i}_{s}"), value_from_seed(*ty, (i * 31 + s) as u64));
            }

            let mut layout = spec.superclass.map_or_else(Vec::new, |s| layouts[s].clone());
            layout.extend(spec.fields.iter().copied());
            classes.push(class);
            layouts.push(layout);
        }

        let instances: Vec<ObjectId> = self
            .instances
            .iter()
            .map(|&(class, seed)| {
                let values: Vec<FieldValue> = layouts[class]
                    .iter()
                    .enumerate()
                    .map(|(k, ty)| value_from_seed(*ty, seed.wrapping_add(k as u64)))
                    .collect();
                heap.add_instance(classes[class], &values)
            })
            .collect();

        if !self.primitive_arrays.is_empty() {
            let array_class = heap.add_class("gen.PrimitiveArray", Some(root), &[]);
            for array in &self.primitive_arrays {
                heap.add_primitive_array(array_class, array.clone());
            }
        }
        if !self.object_arrays.is_empty() {
            let array_class = heap.add_class("[Ljava.lang.Object;", Some(root), &[]);
            for elements in &self.object_arrays {
                let ids: Vec<ObjectId> = elements.iter().map(|&e| instances[e]).collect();
                heap.add_object_array(array_class, &ids);
            }
        }

        for (n, &object) in instances.iter().take(self.roots).enumerate() {
            heap.add_root(HeapRoot::jni_global(object, n as u32 + 1));
        }
        heap.add_root(HeapRoot::new(RootKind::StickyClass, root));
        heap
    }
}
