//! Object sub-records.

use crate::config::{DumpConfig, FieldOrder};
use crate::context::{DumpContext, DumpPhase};
use crate::error::{Component, DumpError, DumpResult, Reason};
use crate::model::{ObjectKind, ObjectModel};
use crate::table::FieldDescriptor;
use crate::types::{ClassId, ObjectId};
use hprof_codec::{FieldValue, HeapTag};
use tracing::trace;

/// Serializes classes, instances and arrays into the current segment.
///
/// Every value is read from the object model and type-checked before the
/// first byte of a sub-record is appended, so a rejected object leaves the
/// segment untouched.
pub struct ObjectEncoder<'m, M: ObjectModel + ?Sized> {
    model: &'m M,
    field_order: FieldOrder,
    omit_primitive_data: bool,
}

impl<'m, M: ObjectModel + ?Sized> ObjectEncoder<'m, M> {
    /// Creates an encoder over `model`.
    pub fn new(model: &'m M, config: &DumpConfig) -> Self {
        Self {
            model,
            field_order: config.field_order,
            omit_primitive_data: config.omit_primitive_array_data,
        }
    }

    /// The object model.
    pub fn model(&self) -> &'m M {
        self.model
    }

    /// Registers `class` (and its superclasses) in the context's class table.
    pub fn register_class(&self, ctx: &mut DumpContext<'_>, class: ObjectId) -> DumpResult<ClassId> {
        ctx.classes
            .lookup_or_insert(class, self.model, &mut ctx.strings)
    }

    /// Writes the sub-record for `object`.
    ///
    /// Returns `false` for a class whose definition was already written.
    ///
    /// # Errors
    ///
    /// - `ProtocolMisuse(UnknownObject)` if the model cannot describe the object
    /// - `ProtocolMisuse(FieldTypeMismatch)` if a typed read returns another type
    /// - `ProtocolMisuse(PhaseOrder)` outside the heap dump phase
    pub fn encode(&self, ctx: &mut DumpContext<'_>, object: ObjectId) -> DumpResult<bool> {
        let kind = self
            .model
            .object_kind(object)
            .filter(|_| !object.is_null())
            .ok_or_else(|| unknown(object))?;
        match kind {
            ObjectKind::Class => self.encode_class(ctx, object),
            ObjectKind::Instance => self.encode_instance(ctx, object).map(|()| true),
            ObjectKind::ObjectArray => self.encode_object_array(ctx, object).map(|()| true),
            ObjectKind::PrimitiveArray => self.encode_primitive_array(ctx, object).map(|()| true),
        }
    }

    fn read_typed(&self, object: ObjectId, field: &FieldDescriptor) -> DumpResult<FieldValue> {
        let value = self
            .model
            .read_field(object, field.offset, field.basic_type)
            .ok_or_else(|| unknown(object).with_tag(format!("{object} offset {}", field.offset)))?;
        if value.basic_type() != field.basic_type {
            return Err(
                DumpError::misuse(Component::ObjectEncoder, Reason::FieldTypeMismatch).with_tag(
                    format!(
                        "{object} offset {}: expected {:?}, read {:?}",
                        field.offset,
                        field.basic_type,
                        value.basic_type()
                    ),
                ),
            );
        }
        Ok(value)
    }

    fn class_of(&self, ctx: &mut DumpContext<'_>, object: ObjectId) -> DumpResult<ClassId> {
        let class = self
            .model
            .class_of(object)
            .ok_or_else(|| unknown(object).with_tag(format!("no class for {object}")))?;
        self.register_class(ctx, class)
    }

    fn encode_class(&self, ctx: &mut DumpContext<'_>, class: ObjectId) -> DumpResult<bool> {
        ctx.require_phase(DumpPhase::HeapDump, "class dump")?;
        let id = self.register_class(ctx, class)?;
        let entry = ctx.classes.get(id)?;
        if entry.is_dumped() {
            return Ok(false);
        }
        let entry = entry.clone();
        let fields = ctx.classes.declared_layout(id, self.field_order)?;
        let statics = entry
            .static_fields
            .iter()
            .map(|f| Ok((*f, self.read_typed(class, f)?)))
            .collect::<DumpResult<Vec<_>>>()?;
        let static_count = count_u16(statics.len(), class, "static fields")?;
        let field_count = count_u16(fields.len(), class, "instance fields")?;

        ctx.begin_sub_record(Some(self.model.heap_of(class)))?;
        let body = ctx.body_mut();
        body.add_u1(HeapTag::ClassDump.as_byte())?;
        body.add_id(id.as_u32())?;
        body.add_u4(entry.stack_trace_serial)?;
        body.add_id(entry.super_id.map_or(0, ClassId::as_u32))?;
        body.add_id(entry.loader.as_u32())?;
        // signers, protection domain, two reserved ids
        body.add_id_list(&[0; 4])?;
        body.add_u4(entry.instance_size)?;
        // constant pool
        body.add_u2(0)?;
        body.add_u2(static_count)?;
        for (field, value) in &statics {
            body.add_id(field.name_id.as_u32())?;
            body.add_u1(field.basic_type.as_byte())?;
            value.encode(body)?;
        }
        body.add_u2(field_count)?;
        for field in &fields {
            body.add_id(field.name_id.as_u32())?;
            body.add_u1(field.basic_type.as_byte())?;
        }

        ctx.end_object();
        ctx.counters.class_dumps += 1;
        ctx.classes.mark_dumped(id)?;
        trace!(class = %id, statics = statics.len(), fields = fields.len(), "class dumped");
        Ok(true)
    }

    fn encode_instance(&self, ctx: &mut DumpContext<'_>, object: ObjectId) -> DumpResult<()> {
        ctx.require_phase(DumpPhase::HeapDump, "instance dump")?;
        let class_id = self.class_of(ctx, object)?;
        let layout = ctx.classes.instance_layout(class_id, self.field_order)?;
        let values = layout
            .iter()
            .map(|f| self.read_typed(object, f))
            .collect::<DumpResult<Vec<_>>>()?;
        let data_len: usize = layout.iter().map(|f| f.basic_type.size()).sum();
        let data_len = u32::try_from(data_len).map_err(|_| too_large(object, "instance data"))?;

        ctx.begin_sub_record(Some(self.model.heap_of(object)))?;
        let body = ctx.body_mut();
        body.add_u1(HeapTag::InstanceDump.as_byte())?;
        body.add_id(object.as_u32())?;
        body.add_u4(self.model.stack_trace_serial(object))?;
        body.add_id(class_id.as_u32())?;
        body.add_u4(data_len)?;
        for value in &values {
            value.encode(body)?;
        }
        ctx.end_object();
        Ok(())
    }

    fn encode_object_array(&self, ctx: &mut DumpContext<'_>, array: ObjectId) -> DumpResult<()> {
        ctx.require_phase(DumpPhase::HeapDump, "object array dump")?;
        let class_id = self.class_of(ctx, array)?;
        let elements: Vec<u32> = self
            .model
            .object_array_elements(array)
            .ok_or_else(|| unknown(array))?
            .into_iter()
            .map(ObjectId::as_u32)
            .collect();
        let len = u32::try_from(elements.len()).map_err(|_| too_large(array, "array length"))?;

        ctx.begin_sub_record(Some(self.model.heap_of(array)))?;
        let body = ctx.body_mut();
        body.add_u1(HeapTag::ObjectArrayDump.as_byte())?;
        body.add_id(array.as_u32())?;
        body.add_u4(self.model.stack_trace_serial(array))?;
        body.add_u4(len)?;
        body.add_id(class_id.as_u32())?;
        body.add_id_list(&elements)?;
        ctx.end_object();
        Ok(())
    }

    fn encode_primitive_array(&self, ctx: &mut DumpContext<'_>, array: ObjectId) -> DumpResult<()> {
        ctx.require_phase(DumpPhase::HeapDump, "primitive array dump")?;
        if let Some(class) = self.model.class_of(array) {
            self.register_class(ctx, class)?;
        }
        let elements = self
            .model
            .primitive_array_elements(array)
            .ok_or_else(|| unknown(array))?;
        let len = u32::try_from(elements.len()).map_err(|_| too_large(array, "array length"))?;

        ctx.begin_sub_record(Some(self.model.heap_of(array)))?;
        let tag = if self.omit_primitive_data {
            HeapTag::PrimitiveArrayNoDataDump
        } else {
            HeapTag::PrimitiveArrayDump
        };
        let body = ctx.body_mut();
        body.add_u1(tag.as_byte())?;
        body.add_id(array.as_u32())?;
        body.add_u4(self.model.stack_trace_serial(array))?;
        body.add_u4(len)?;
        body.add_u1(elements.element_type().as_byte())?;
        if !self.omit_primitive_data {
            elements.encode_elements(body)?;
        }
        ctx.end_object();
        Ok(())
    }

    /// Writes the definition of every registered class not yet dumped.
    ///
    /// Returns the number of class dumps written.
    pub fn dump_remaining_classes(&self, ctx: &mut DumpContext<'_>) -> DumpResult<usize> {
        let mut written = 0;
        for id in ctx.classes.undumped() {
            if self.encode_class(ctx, id.object())? {
                written += 1;
            }
        }
        Ok(written)
    }
}

impl<M: ObjectModel + ?Sized> std::fmt::Debug for ObjectEncoder<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectEncoder")
            .field("field_order", &self.field_order)
            .field("omit_primitive_data", &self.omit_primitive_data)
            .finish_non_exhaustive()
    }
}

fn unknown(object: ObjectId) -> DumpError {
    DumpError::misuse(Component::ObjectEncoder, Reason::UnknownObject).with_tag(object.to_string())
}

fn too_large(object: ObjectId, what: &str) -> DumpError {
    DumpError::misuse(Component::ObjectEncoder, Reason::RecordTooLarge)
        .with_tag(format!("{what} of {object}"))
}

fn count_u16(n: usize, object: ObjectId, what: &str) -> DumpResult<u16> {
    u16::try_from(n).map_err(|_| too_large(object, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::TestModel;
    use hprof_codec::{BasicType, HeapId, PrimitiveArray};
    use hprof_sink::InMemorySink;

    fn heap_context(config: &DumpConfig) -> DumpContext<'static> {
        let mut ctx = DumpContext::open(Box::new(InMemorySink::new()), config).unwrap();
        ctx.start_heap_dump().unwrap();
        ctx
    }

    fn body(ctx: &DumpContext<'_>) -> Vec<u8> {
        ctx.record.body().as_bytes().to_vec()
    }

    #[test]
    fn empty_class_dump_layout() {
        let mut model = TestModel::new();
        let class = model.add_class("Empty", None, &[], &[]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        let encoder = ObjectEncoder::new(&model, &config);

        assert!(encoder.encode(&mut ctx, class).unwrap());
        let bytes = body(&ctx);
        // tag, 7 ids + serial, size, cp count, statics, fields
        assert_eq!(bytes.len(), 1 + 8 * 4 + 4 + 2 + 2 + 2);
        assert_eq!(bytes[0], 0x20);
        assert_eq!(&bytes[1..5], &class.as_u32().to_be_bytes());
        assert_eq!(&bytes[33..37], &0u32.to_be_bytes());
        assert_eq!(&bytes[37..], &[0; 6]);
    }

    #[test]
    fn class_dumped_once() {
        let mut model = TestModel::new();
        let class = model.add_class("Once", None, &[("x", BasicType::Int)], &[]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        let encoder = ObjectEncoder::new(&model, &config);

        assert!(encoder.encode(&mut ctx, class).unwrap());
        let len = ctx.record.body().len();
        assert!(!encoder.encode(&mut ctx, class).unwrap());
        assert_eq!(ctx.record.body().len(), len);
        assert_eq!(encoder.dump_remaining_classes(&mut ctx).unwrap(), 0);
    }

    #[test]
    fn statics_are_type_tagged() {
        let mut model = TestModel::new();
        let class = model.add_class("S", None, &[], &[("k", FieldValue::Short(-2))]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, class).unwrap();

        let bytes = body(&ctx);
        let statics = &bytes[39..];
        assert_eq!(&statics[..2], &1u16.to_be_bytes());
        assert_eq!(statics[6], BasicType::Short.as_byte());
        assert_eq!(&statics[7..9], &[0xFF, 0xFE]);
        assert_eq!(&statics[9..11], &0u16.to_be_bytes());
    }

    #[test]
    fn instance_with_two_ints() {
        let mut model = TestModel::new();
        let class = model.add_class("Pair", None, &[("a", BasicType::Int), ("b", BasicType::Int)], &[]);
        let obj = model.add_instance(class, &[FieldValue::Int(1), FieldValue::Int(-1)]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, obj).unwrap();

        let bytes = body(&ctx);
        assert_eq!(bytes[0], 0x21);
        assert_eq!(&bytes[1..5], &obj.as_u32().to_be_bytes());
        assert_eq!(&bytes[9..13], &class.as_u32().to_be_bytes());
        assert_eq!(&bytes[13..17], &8u32.to_be_bytes());
        assert_eq!(&bytes[17..], &[0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn inherited_fields_follow_field_order() {
        let mut model = TestModel::new();
        let base = model.add_class("Base", None, &[("a", BasicType::Byte)], &[]);
        let derived = model.add_class("Derived", Some(base), &[("b", BasicType::Short)], &[]);
        let obj = model.add_instance(derived, &[FieldValue::Byte(7), FieldValue::Short(9)]);

        let hierarchical = DumpConfig::default();
        let mut ctx = heap_context(&hierarchical);
        ObjectEncoder::new(&model, &hierarchical).encode(&mut ctx, obj).unwrap();
        assert_eq!(&body(&ctx)[17..], &[0, 9, 7]);

        let flattened = DumpConfig::new().field_order(FieldOrder::Flattened);
        let mut ctx = heap_context(&flattened);
        ObjectEncoder::new(&model, &flattened).encode(&mut ctx, obj).unwrap();
        assert_eq!(&body(&ctx)[17..], &[7, 0, 9]);
    }

    struct LyingModel(TestModel);

    impl ObjectModel for LyingModel {
        fn object_kind(&self, object: ObjectId) -> Option<ObjectKind> {
            self.0.object_kind(object)
        }
        fn class_of(&self, object: ObjectId) -> Option<ObjectId> {
            self.0.class_of(object)
        }
        fn class_name(&self, class: ObjectId) -> Option<String> {
            self.0.class_name(class)
        }
        fn superclass_of(&self, class: ObjectId) -> Option<ObjectId> {
            self.0.superclass_of(class)
        }
        fn instance_size(&self, class: ObjectId) -> u32 {
            self.0.instance_size(class)
        }
        fn instance_fields(&self, class: ObjectId) -> Vec<crate::model::FieldInfo> {
            self.0.instance_fields(class)
        }
        fn static_fields(&self, class: ObjectId) -> Vec<crate::model::FieldInfo> {
            self.0.static_fields(class)
        }
        fn read_field(&self, _: ObjectId, _: u32, _: BasicType) -> Option<FieldValue> {
            Some(FieldValue::Long(0))
        }
        fn object_array_elements(&self, array: ObjectId) -> Option<Vec<ObjectId>> {
            self.0.object_array_elements(array)
        }
        fn primitive_array_elements(&self, array: ObjectId) -> Option<PrimitiveArray> {
            self.0.primitive_array_elements(array)
        }
    }

    #[test]
    fn type_mismatch_leaves_segment_untouched() {
        let mut inner = TestModel::new();
        let class = inner.add_class("T", None, &[("a", BasicType::Int)], &[]);
        let obj = inner.add_instance(class, &[FieldValue::Int(1)]);
        let model = LyingModel(inner);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);

        let err = ObjectEncoder::new(&model, &config).encode(&mut ctx, obj).unwrap_err();
        assert_eq!(err.site().reason, Reason::FieldTypeMismatch);
        assert!(ctx.record.body().is_empty());
    }

    #[test]
    fn unknown_object_is_misuse() {
        let model = TestModel::new();
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        let encoder = ObjectEncoder::new(&model, &config);
        let err = encoder.encode(&mut ctx, ObjectId(0xdead)).unwrap_err();
        assert_eq!(err.site().reason, Reason::UnknownObject);
        assert!(encoder.encode(&mut ctx, ObjectId::NULL).is_err());
    }

    #[test]
    fn object_array_layout() {
        let mut model = TestModel::new();
        let class = model.add_class("Object[]", None, &[], &[]);
        let array = model.add_object_array(class, &[ObjectId(0x10), ObjectId::NULL]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, array).unwrap();

        let bytes = body(&ctx);
        assert_eq!(bytes[0], 0x22);
        assert_eq!(&bytes[9..13], &2u32.to_be_bytes());
        assert_eq!(&bytes[13..17], &class.as_u32().to_be_bytes());
        assert_eq!(&bytes[17..], &[0, 0, 0, 0x10, 0, 0, 0, 0]);
    }

    #[test]
    fn primitive_array_with_and_without_data() {
        let mut model = TestModel::new();
        let class = model.add_class("int[]", None, &[], &[]);
        let array = model.add_primitive_array(class, PrimitiveArray::Int(vec![1, 2]));

        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, array).unwrap();
        let bytes = body(&ctx);
        assert_eq!(bytes[0], 0x23);
        assert_eq!(bytes[13], BasicType::Int.as_byte());
        assert_eq!(&bytes[14..], &[0, 0, 0, 1, 0, 0, 0, 2]);

        let config = DumpConfig::new().omit_primitive_array_data(true);
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, array).unwrap();
        let bytes = body(&ctx);
        assert_eq!(bytes[0], 0xc3);
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[9..13], &2u32.to_be_bytes());
    }

    #[test]
    fn heap_change_inserts_info() {
        let mut model = TestModel::new();
        let class = model.add_class("A", None, &[], &[]);
        let obj = model.add_instance(class, &[]);
        model.set_heap(obj, HeapId::Zygote);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        ObjectEncoder::new(&model, &config).encode(&mut ctx, obj).unwrap();

        let bytes = body(&ctx);
        assert_eq!(bytes[0], 0xfe);
        assert_eq!(&bytes[1..5], &u32::from(b'Z').to_be_bytes());
        assert_eq!(bytes[9], 0x21);
    }

    #[test]
    fn sweep_dumps_unvisited_classes() {
        let mut model = TestModel::new();
        let base = model.add_class("Base", None, &[], &[]);
        let derived = model.add_class("Derived", Some(base), &[], &[]);
        let obj = model.add_instance(derived, &[]);
        let config = DumpConfig::default();
        let mut ctx = heap_context(&config);
        let encoder = ObjectEncoder::new(&model, &config);

        encoder.encode(&mut ctx, obj).unwrap();
        encoder.encode(&mut ctx, base).unwrap();
        assert_eq!(encoder.dump_remaining_classes(&mut ctx).unwrap(), 1);
        assert!(ctx.classes().undumped().is_empty());
        assert_eq!(ctx.counters().class_dumps, 2);
    }
}
