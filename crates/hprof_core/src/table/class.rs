//! Class interning.

use super::StringTable;
use crate::config::FieldOrder;
use crate::error::{Component, DumpError, DumpResult, Reason};
use crate::model::{FieldInfo, ObjectKind, ObjectModel};
use crate::types::{ClassId, ObjectId, StringId};
use hprof_codec::BasicType;
use std::collections::HashMap;

/// One field of a class layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Interned field name.
    pub name_id: StringId,
    /// Field type.
    pub basic_type: BasicType,
    /// Offset passed back to the object model for typed reads.
    pub offset: u32,
}

/// Everything captured about a class at first reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Class id (the class object's id).
    pub id: ClassId,
    /// 1-based serial in load order.
    pub serial: u32,
    /// Interned class name.
    pub name_id: StringId,
    /// Superclass, if any.
    pub super_id: Option<ClassId>,
    /// Class loader object, or null.
    pub loader: ObjectId,
    /// Stack trace serial of the class object.
    pub stack_trace_serial: u32,
    /// Instance size in bytes.
    pub instance_size: u32,
    /// Instance fields declared by this class, in declared order.
    pub instance_fields: Vec<FieldDescriptor>,
    /// Static fields declared by this class.
    pub static_fields: Vec<FieldDescriptor>,
    dumped: bool,
}

impl ClassEntry {
    /// Returns `true` once the class definition sub-record was emitted.
    pub fn is_dumped(&self) -> bool {
        self.dumped
    }
}

#[derive(Debug, Default)]
struct ClassIndex {
    slots: HashMap<ClassId, usize>,
    entries: Vec<ClassEntry>,
    loaded: usize,
}

impl ClassIndex {
    fn entry(&self, id: ClassId) -> DumpResult<&ClassEntry> {
        self.slots
            .get(&id)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| {
                DumpError::misuse(Component::ClassTable, Reason::UnregisteredId)
                    .with_tag(id.to_string())
            })
    }

    /// Classes from `id` up to the root of its hierarchy.
    fn chain(&self, id: ClassId) -> DumpResult<Vec<&ClassEntry>> {
        let mut chain = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let entry = self.entry(current)?;
            chain.push(entry);
            next = entry.super_id;
        }
        Ok(chain)
    }
}

/// Class interning table.
///
/// Registering a class captures its layout from the object model and
/// registers its superclasses first, so a class entry never refers to an
/// unregistered superclass.
#[derive(Debug, Default)]
pub struct ClassTable {
    inner: Option<ClassIndex>,
}

impl ClassTable {
    /// Creates a table that must be started before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index.
    pub fn startup(&mut self) {
        self.inner = Some(ClassIndex::default());
    }

    /// Frees the index.
    pub fn shutdown(&mut self) {
        self.inner = None;
    }

    /// Returns `true` between startup and shutdown.
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    fn index(&self) -> DumpResult<&ClassIndex> {
        self.inner
            .as_ref()
            .ok_or_else(|| DumpError::misuse(Component::ClassTable, Reason::TableUninitialized))
    }

    fn index_mut(&mut self) -> DumpResult<&mut ClassIndex> {
        self.inner
            .as_mut()
            .ok_or_else(|| DumpError::misuse(Component::ClassTable, Reason::TableUninitialized))
    }

    /// Returns the id of `class`, registering it and its superclasses if unseen.
    ///
    /// Names of the class and of its fields are interned in `strings`.
    ///
    /// # Errors
    ///
    /// - `ProtocolMisuse(TableUninitialized)` if either table is not started
    /// - `ProtocolMisuse(UnknownObject)` if the model does not describe
    ///   `class` (or one of its superclasses) as a class, or the
    ///   superclass chain loops
    /// - `AllocationFailure(TableInsert)` if an index cannot grow
    pub fn lookup_or_insert<M>(
        &mut self,
        class: ObjectId,
        model: &M,
        strings: &mut StringTable,
    ) -> DumpResult<ClassId>
    where
        M: ObjectModel + ?Sized,
    {
        let id = ClassId::of(class);
        let index = self.index_mut()?;
        if index.slots.contains_key(&id) {
            return Ok(id);
        }

        // Collect the unregistered part of the hierarchy, nearest first.
        let mut missing = Vec::new();
        let mut next = Some(class);
        while let Some(current) = next {
            if index.slots.contains_key(&ClassId::of(current)) {
                break;
            }
            if missing.contains(&current) {
                return Err(DumpError::misuse(Component::ClassTable, Reason::UnknownObject)
                    .with_tag(format!("superclass cycle at {current}")));
            }
            if current.is_null() || model.object_kind(current) != Some(ObjectKind::Class) {
                return Err(DumpError::misuse(Component::ClassTable, Reason::UnknownObject)
                    .with_tag(current.to_string()));
            }
            missing.push(current);
            next = model.superclass_of(current).filter(|s| !s.is_null());
        }

        for &object in missing.iter().rev() {
            let entry = Self::capture(object, index.entries.len(), model, strings)?;
            index
                .slots
                .try_reserve(1)
                .and_then(|()| index.entries.try_reserve(1))
                .map_err(|_| {
                    DumpError::allocation(Component::ClassTable, Reason::TableInsert)
                        .with_tag(object.to_string())
                })?;
            index.slots.insert(entry.id, index.entries.len());
            index.entries.push(entry);
        }
        Ok(id)
    }

    fn capture<M>(
        object: ObjectId,
        slot: usize,
        model: &M,
        strings: &mut StringTable,
    ) -> DumpResult<ClassEntry>
    where
        M: ObjectModel + ?Sized,
    {
        let name = model.class_name(object).ok_or_else(|| {
            DumpError::misuse(Component::ClassTable, Reason::UnknownObject).with_tag(object.to_string())
        })?;
        let serial = u32::try_from(slot + 1)
            .map_err(|_| DumpError::allocation(Component::ClassTable, Reason::TableInsert))?;
        let name_id = strings.lookup_or_insert(&name)?;

        let mut intern_fields = |fields: Vec<FieldInfo>| -> DumpResult<Vec<FieldDescriptor>> {
            fields
                .into_iter()
                .map(|f| {
                    Ok(FieldDescriptor {
                        name_id: strings.lookup_or_insert(&f.name)?,
                        basic_type: f.basic_type,
                        offset: f.offset,
                    })
                })
                .collect()
        };
        let instance_fields = intern_fields(model.instance_fields(object))?;
        let static_fields = intern_fields(model.static_fields(object))?;

        Ok(ClassEntry {
            id: ClassId::of(object),
            serial,
            name_id,
            super_id: model
                .superclass_of(object)
                .filter(|s| !s.is_null())
                .map(ClassId::of),
            loader: model.class_loader_of(object),
            stack_trace_serial: model.stack_trace_serial(object),
            instance_size: model.instance_size(object),
            instance_fields,
            static_fields,
            dumped: false,
        })
    }

    /// Returns the entry for `id`.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse(UnregisteredId)` if the class was never registered.
    pub fn get(&self, id: ClassId) -> DumpResult<&ClassEntry> {
        self.index()?.entry(id)
    }

    /// Number of registered classes; zero when not started.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.entries.len())
    }

    /// Returns `true` if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of classes whose LOAD_CLASS record has not been written.
    pub fn pending(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |i| i.entries.len() - i.loaded)
    }

    /// Passes every class without a LOAD_CLASS record to `write`, in serial order.
    pub fn drain_pending<F>(&mut self, mut write: F) -> DumpResult<usize>
    where
        F: FnMut(&ClassEntry) -> DumpResult<()>,
    {
        let index = self.index_mut()?;
        let start = index.loaded;
        while index.loaded < index.entries.len() {
            write(&index.entries[index.loaded])?;
            index.loaded += 1;
        }
        Ok(index.loaded - start)
    }

    /// Records that the class definition was emitted.
    ///
    /// Returns `false` if it had already been emitted.
    pub fn mark_dumped(&mut self, id: ClassId) -> DumpResult<bool> {
        let index = self.index_mut()?;
        let slot = *index.slots.get(&id).ok_or_else(|| {
            DumpError::misuse(Component::ClassTable, Reason::UnregisteredId).with_tag(id.to_string())
        })?;
        let entry = &mut index.entries[slot];
        let first = !entry.dumped;
        entry.dumped = true;
        Ok(first)
    }

    /// Classes whose definition has not been emitted, in serial order.
    pub fn undumped(&self) -> Vec<ClassId> {
        self.inner.as_ref().map_or_else(Vec::new, |i| {
            i.entries
                .iter()
                .filter(|e| !e.dumped)
                .map(|e| e.id)
                .collect()
        })
    }

    /// Field values an instance of `id` carries, in dump order.
    pub fn instance_layout(&self, id: ClassId, order: FieldOrder) -> DumpResult<Vec<FieldDescriptor>> {
        let chain = self.index()?.chain(id)?;
        let fields = match order {
            FieldOrder::Hierarchical => chain
                .iter()
                .flat_map(|e| e.instance_fields.iter().copied())
                .collect(),
            FieldOrder::Flattened => chain
                .iter()
                .rev()
                .flat_map(|e| e.instance_fields.iter().copied())
                .collect(),
        };
        Ok(fields)
    }

    /// Instance field descriptors listed in the class definition of `id`.
    pub fn declared_layout(&self, id: ClassId, order: FieldOrder) -> DumpResult<Vec<FieldDescriptor>> {
        match order {
            FieldOrder::Hierarchical => Ok(self.get(id)?.instance_fields.clone()),
            FieldOrder::Flattened => self.instance_layout(id, order),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::TestModel;

    fn tables() -> (StringTable, ClassTable) {
        let mut strings = StringTable::new();
        let mut classes = ClassTable::new();
        strings.startup();
        classes.startup();
        (strings, classes)
    }

    fn hierarchy() -> (TestModel, ObjectId, ObjectId) {
        let mut heap = TestModel::new();
        let base = heap.add_class("Base", None, &[("a", BasicType::Int)], &[]);
        let derived = heap.add_class(
            "Derived",
            Some(base),
            &[("b", BasicType::Long), ("c", BasicType::Byte)],
            &[],
        );
        (heap, base, derived)
    }

    #[test]
    fn superclass_registered_first() {
        let (heap, base, derived) = hierarchy();
        let (mut strings, mut classes) = tables();

        let id = classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();
        assert_eq!(id, ClassId::of(derived));
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.get(ClassId::of(base)).unwrap().serial, 1);
        assert_eq!(classes.get(id).unwrap().serial, 2);
        assert_eq!(classes.get(id).unwrap().super_id, Some(ClassId::of(base)));
    }

    #[test]
    fn lookup_is_idempotent() {
        let (heap, _, derived) = hierarchy();
        let (mut strings, mut classes) = tables();
        let a = classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();
        let interned = strings.len();
        let b = classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();
        assert_eq!(a, b);
        assert_eq!(classes.len(), 2);
        assert_eq!(strings.len(), interned);
    }

    #[test]
    fn names_and_fields_are_interned() {
        let (heap, _, derived) = hierarchy();
        let (mut strings, mut classes) = tables();
        let id = classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();
        let entry = classes.get(id).unwrap();
        assert_eq!(strings.get(entry.name_id).unwrap(), "Derived");
        let names: Vec<_> = entry
            .instance_fields
            .iter()
            .map(|f| strings.get(f.name_id).unwrap())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn layouts_follow_field_order() {
        let (heap, _, derived) = hierarchy();
        let (mut strings, mut classes) = tables();
        let id = classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();

        let types = |fields: Vec<FieldDescriptor>| -> Vec<BasicType> {
            fields.iter().map(|f| f.basic_type).collect()
        };
        assert_eq!(
            types(classes.instance_layout(id, FieldOrder::Hierarchical).unwrap()),
            vec![BasicType::Long, BasicType::Byte, BasicType::Int]
        );
        assert_eq!(
            types(classes.instance_layout(id, FieldOrder::Flattened).unwrap()),
            vec![BasicType::Int, BasicType::Long, BasicType::Byte]
        );
        assert_eq!(classes.declared_layout(id, FieldOrder::Hierarchical).unwrap().len(), 2);
        assert_eq!(classes.declared_layout(id, FieldOrder::Flattened).unwrap().len(), 3);
    }

    #[test]
    fn non_class_object_is_misuse() {
        let (mut heap, _, derived) = hierarchy();
        let instance = heap.add_instance(derived, &[]);
        let (mut strings, mut classes) = tables();
        let err = classes.lookup_or_insert(instance, &heap, &mut strings).unwrap_err();
        assert_eq!(err.site().reason, Reason::UnknownObject);
        assert!(classes.is_empty());
    }

    #[test]
    fn unregistered_and_uninitialized() {
        let (_, classes) = tables();
        let err = classes.get(ClassId(99)).unwrap_err();
        assert_eq!(err.site().reason, Reason::UnregisteredId);

        let empty = ClassTable::new();
        let err = empty.get(ClassId(99)).unwrap_err();
        assert_eq!(err.site().reason, Reason::TableUninitialized);
    }

    #[test]
    fn dumped_once() {
        let (heap, base, derived) = hierarchy();
        let (mut strings, mut classes) = tables();
        classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();

        assert!(classes.mark_dumped(ClassId::of(base)).unwrap());
        assert!(!classes.mark_dumped(ClassId::of(base)).unwrap());
        assert_eq!(classes.undumped(), vec![ClassId::of(derived)]);
    }

    #[test]
    fn drain_in_serial_order() {
        let (heap, _, derived) = hierarchy();
        let (mut strings, mut classes) = tables();
        classes.lookup_or_insert(derived, &heap, &mut strings).unwrap();

        let mut serials = Vec::new();
        let n = classes
            .drain_pending(|e| {
                serials.push(e.serial);
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(serials, vec![1, 2]);
        assert_eq!(classes.pending(), 0);
    }
}
