//! In-memory heap for driving dumps in tests.
//!
//! [`SyntheticHeap`] implements both [`ObjectModel`] and [`HeapWalker`],
//! so a test can build a small heap and hand it to the engine as-is.

use hprof_codec::{BasicType, FieldValue, HeapId, PrimitiveArray, NULL_STACK_TRACE};
use hprof_core::{
    DumpResult, FieldInfo, FieldOrder, HeapRoot, HeapWalker, ObjectId, ObjectKind, ObjectModel,
};
use std::collections::HashMap;

/// First identifier handed out by [`SyntheticHeap`].
pub const FIRST_OBJECT_ID: u32 = 0x1000;

const ID_STRIDE: u32 = 0x10;

#[derive(Debug, Clone)]
struct SyntheticClass {
    name: String,
    superclass: Option<ObjectId>,
    loader: ObjectId,
    size: u32,
    fields: Vec<FieldInfo>,
    statics: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
enum Body {
    Class(SyntheticClass),
    Instance,
    ObjectArray(Vec<ObjectId>),
    PrimitiveArray(PrimitiveArray),
}

#[derive(Debug, Clone)]
struct Object {
    class: Option<ObjectId>,
    heap: HeapId,
    stack_trace_serial: u32,
    body: Body,
}

/// A quiesced heap built by hand.
///
/// Objects are walked in creation order. Instance field offsets are
/// assigned sequentially, superclass fields first.
#[derive(Debug, Clone)]
pub struct SyntheticHeap {
    next: u32,
    objects: HashMap<ObjectId, Object>,
    order: Vec<ObjectId>,
    values: HashMap<(ObjectId, u32), FieldValue>,
    roots: Vec<HeapRoot>,
    prescan_classes: bool,
    walk_class_objects: bool,
}

impl Default for SyntheticHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self {
            next: FIRST_OBJECT_ID,
            objects: HashMap::new(),
            order: Vec::new(),
            values: HashMap::new(),
            roots: Vec::new(),
            prescan_classes: true,
            walk_class_objects: true,
        }
    }

    /// Makes `visit_classes` report nothing, so classes are only found
    /// during the heap walk.
    #[must_use]
    pub fn without_class_prescan(mut self) -> Self {
        self.prescan_classes = false;
        self
    }

    /// Leaves class objects out of `visit_objects`.
    #[must_use]
    pub fn hide_class_objects(mut self) -> Self {
        self.walk_class_objects = false;
        self
    }

    fn alloc(&mut self, class: Option<ObjectId>, body: Body) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += ID_STRIDE;
        self.objects.insert(
            id,
            Object {
                class,
                heap: HeapId::Default,
                stack_trace_serial: NULL_STACK_TRACE,
                body,
            },
        );
        self.order.push(id);
        id
    }

    fn class(&self, class: ObjectId) -> Option<&SyntheticClass> {
        match &self.objects.get(&class)?.body {
            Body::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Adds a class declaring `fields`.
    ///
    /// # Panics
    ///
    /// Panics if `superclass` is not a class of this heap.
    pub fn add_class(
        &mut self,
        name: &str,
        superclass: Option<ObjectId>,
        fields: &[(&str, BasicType)],
    ) -> ObjectId {
        let mut offset = superclass.map_or(0, |s| {
            self.class(s).expect("superclass must be a class").size
        });
        let fields = fields
            .iter()
            .map(|&(name, ty)| {
                let field = FieldInfo::new(name, ty, offset);
                offset += ty.size() as u32;
                field
            })
            .collect();
        self.alloc(
            None,
            Body::Class(SyntheticClass {
                name: name.to_string(),
                superclass,
                loader: ObjectId::NULL,
                size: offset,
                fields,
                statics: Vec::new(),
            }),
        )
    }

    /// Adds a static field with its value to `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` is not a class of this heap.
    pub fn add_static(&mut self, class: ObjectId, name: &str, value: FieldValue) {
        let Some(Object {
            body: Body::Class(c),
            ..
        }) = self.objects.get_mut(&class)
        else {
            panic!("{class} is not a class");
        };
        let slot = c.statics.len() as u32;
        c.statics.push(FieldInfo::new(name, value.basic_type(), slot));
        self.values.insert((class, slot), value);
    }

    /// Sets the defining loader of `class`.
    pub fn set_class_loader(&mut self, class: ObjectId, loader: ObjectId) {
        if let Some(Object {
            body: Body::Class(c),
            ..
        }) = self.objects.get_mut(&class)
        {
            c.loader = loader;
        }
    }

    /// Adds an instance of `class`.
    ///
    /// `values` follow the flattened layout: root class fields first.
    ///
    /// # Panics
    ///
    /// Panics if the values do not match the class layout.
    pub fn add_instance(&mut self, class: ObjectId, values: &[FieldValue]) -> ObjectId {
        let layout = self.flattened_fields(class);
        assert_eq!(layout.len(), values.len(), "value count must match the layout");
        let id = self.alloc(Some(class), Body::Instance);
        for (field, value) in layout.iter().zip(values) {
            assert_eq!(field.basic_type, value.basic_type(), "field {}", field.name);
            self.values.insert((id, field.offset), *value);
        }
        id
    }

    /// Adds an object array whose class is `class`.
    pub fn add_object_array(&mut self, class: ObjectId, elements: &[ObjectId]) -> ObjectId {
        self.alloc(Some(class), Body::ObjectArray(elements.to_vec()))
    }

    /// Adds a primitive array whose class is `class`.
    pub fn add_primitive_array(&mut self, class: ObjectId, array: PrimitiveArray) -> ObjectId {
        self.alloc(Some(class), Body::PrimitiveArray(array))
    }

    /// Adds a GC root.
    pub fn add_root(&mut self, root: HeapRoot) {
        self.roots.push(root);
    }

    /// Places `object` in `heap`.
    pub fn set_heap(&mut self, object: ObjectId, heap: HeapId) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.heap = heap;
        }
    }

    /// Sets the allocation stack trace serial of `object`.
    pub fn set_stack_trace(&mut self, object: ObjectId, serial: u32) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.stack_trace_serial = serial;
        }
    }

    /// Class objects, in creation order.
    pub fn class_ids(&self) -> Vec<ObjectId> {
        self.ids_where(|o| matches!(o.body, Body::Class(_)))
    }

    /// Instances, in creation order.
    pub fn instance_ids(&self) -> Vec<ObjectId> {
        self.ids_where(|o| matches!(o.body, Body::Instance))
    }

    /// Arrays of either kind, in creation order.
    pub fn array_ids(&self) -> Vec<ObjectId> {
        self.ids_where(|o| matches!(o.body, Body::ObjectArray(_) | Body::PrimitiveArray(_)))
    }

    /// Number of objects, classes included.
    pub fn object_count(&self) -> usize {
        self.order.len()
    }

    /// GC roots in insertion order.
    pub fn roots(&self) -> &[HeapRoot] {
        &self.roots
    }

    fn ids_where(&self, pred: impl Fn(&Object) -> bool) -> Vec<ObjectId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.objects.get(id).is_some_and(&pred))
            .collect()
    }

    /// Class chain of `class`, nearest first.
    fn chain(&self, class: ObjectId) -> Vec<&SyntheticClass> {
        let mut chain = Vec::new();
        let mut next = self.class(class);
        while let Some(c) = next {
            chain.push(c);
            next = c.superclass.and_then(|s| self.class(s));
        }
        chain
    }

    fn flattened_fields(&self, class: ObjectId) -> Vec<FieldInfo> {
        self.chain(class)
            .into_iter()
            .rev()
            .flat_map(|c| c.fields.iter().cloned())
            .collect()
    }

    /// Field values of an instance in the order `order` writes them.
    pub fn field_values(&self, object: ObjectId, order: FieldOrder) -> Vec<FieldValue> {
        let Some(class) = self.class_of(object) else {
            return Vec::new();
        };
        let mut chain = self.chain(class);
        if order == FieldOrder::Flattened {
            chain.reverse();
        }
        chain
            .into_iter()
            .flat_map(|c| c.fields.iter())
            .map(|f| self.value_at(object, f.offset, f.basic_type))
            .collect()
    }

    fn value_at(&self, object: ObjectId, offset: u32, ty: BasicType) -> FieldValue {
        self.values
            .get(&(object, offset))
            .copied()
            .unwrap_or(FieldValue::zero(ty))
    }
}

impl ObjectModel for SyntheticHeap {
    fn object_kind(&self, object: ObjectId) -> Option<ObjectKind> {
        Some(match self.objects.get(&object)?.body {
            Body::Class(_) => ObjectKind::Class,
            Body::Instance => ObjectKind::Instance,
            Body::ObjectArray(_) => ObjectKind::ObjectArray,
            Body::PrimitiveArray(_) => ObjectKind::PrimitiveArray,
        })
    }

    fn class_of(&self, object: ObjectId) -> Option<ObjectId> {
        self.objects.get(&object)?.class
    }

    fn heap_of(&self, object: ObjectId) -> HeapId {
        self.objects.get(&object).map_or(HeapId::Default, |o| o.heap)
    }

    fn stack_trace_serial(&self, object: ObjectId) -> u32 {
        self.objects
            .get(&object)
            .map_or(NULL_STACK_TRACE, |o| o.stack_trace_serial)
    }

    fn class_name(&self, class: ObjectId) -> Option<String> {
        self.class(class).map(|c| c.name.clone())
    }

    fn superclass_of(&self, class: ObjectId) -> Option<ObjectId> {
        self.class(class).and_then(|c| c.superclass)
    }

    fn class_loader_of(&self, class: ObjectId) -> ObjectId {
        self.class(class).map_or(ObjectId::NULL, |c| c.loader)
    }

    fn instance_size(&self, class: ObjectId) -> u32 {
        self.class(class).map_or(0, |c| c.size)
    }

    fn instance_fields(&self, class: ObjectId) -> Vec<FieldInfo> {
        self.class(class).map_or_else(Vec::new, |c| c.fields.clone())
    }

    fn static_fields(&self, class: ObjectId) -> Vec<FieldInfo> {
        self.class(class).map_or_else(Vec::new, |c| c.statics.clone())
    }

    fn read_field(&self, object: ObjectId, offset: u32, basic_type: BasicType) -> Option<FieldValue> {
        self.objects.get(&object)?;
        Some(self.value_at(object, offset, basic_type))
    }

    fn object_array_elements(&self, array: ObjectId) -> Option<Vec<ObjectId>> {
        match &self.objects.get(&array)?.body {
            Body::ObjectArray(elements) => Some(elements.clone()),
            _ => None,
        }
    }

    fn primitive_array_elements(&self, array: ObjectId) -> Option<PrimitiveArray> {
        match &self.objects.get(&array)?.body {
            Body::PrimitiveArray(values) => Some(values.clone()),
            _ => None,
        }
    }
}

impl HeapWalker for SyntheticHeap {
    fn visit_classes(&self, visitor: &mut dyn FnMut(ObjectId) -> DumpResult<()>) -> DumpResult<()> {
        if !self.prescan_classes {
            return Ok(());
        }
        for class in self.class_ids() {
            visitor(class)?;
        }
        Ok(())
    }

    fn visit_roots(&self, visitor: &mut dyn FnMut(&HeapRoot) -> DumpResult<()>) -> DumpResult<()> {
        for root in &self.roots {
            visitor(root)?;
        }
        Ok(())
    }

    fn visit_objects(&self, visitor: &mut dyn FnMut(ObjectId) -> DumpResult<()>) -> DumpResult<()> {
        for id in &self.order {
            let is_class = self
                .objects
                .get(id)
                .is_some_and(|o| matches!(o.body, Body::Class(_)));
            if is_class && !self.walk_class_objects {
                continue;
            }
            visitor(*id)?;
        }
        Ok(())
    }
}
