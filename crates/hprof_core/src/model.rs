//! Collaborator contracts.
//!
//! The writer does not walk the heap or know how objects are laid out in
//! memory. Two collaborators supply that knowledge:
//!
//! - [`ObjectModel`] describes classes and answers typed field reads
//! - [`HeapWalker`] enumerates classes, roots and live objects
//!
//! The heap is assumed quiesced for the whole dump, so answers must not
//! change between calls.

use crate::error::DumpResult;
use crate::heap::HeapRoot;
use crate::types::ObjectId;
use hprof_codec::{BasicType, FieldValue, HeapId, PrimitiveArray, NULL_STACK_TRACE};

/// Category of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A class object.
    Class,
    /// A plain instance.
    Instance,
    /// An array of references.
    ObjectArray,
    /// An array of primitives.
    PrimitiveArray,
}

/// One field as declared by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Field type.
    pub basic_type: BasicType,
    /// Opaque offset used for reads.
    pub offset: u32,
}

impl FieldInfo {
    /// Creates a field description.
    pub fn new(name: impl Into<String>, basic_type: BasicType, offset: u32) -> Self {
        Self {
            name: name.into(),
            basic_type,
            offset,
        }
    }
}

/// Class metadata and typed reads for the runtime being dumped.
pub trait ObjectModel {
    /// Category of `object`, or `None` if the model does not know it.
    fn object_kind(&self, object: ObjectId) -> Option<ObjectKind>;

    /// Class object of an instance or array.
    fn class_of(&self, object: ObjectId) -> Option<ObjectId>;

    /// Heap partition `object` was allocated in.
    fn heap_of(&self, _object: ObjectId) -> HeapId {
        HeapId::Default
    }

    /// Allocation stack trace serial of `object`.
    fn stack_trace_serial(&self, _object: ObjectId) -> u32 {
        NULL_STACK_TRACE
    }

    /// Descriptor or name of a class.
    fn class_name(&self, class: ObjectId) -> Option<String>;

    /// Superclass object, `None` for a root class.
    fn superclass_of(&self, class: ObjectId) -> Option<ObjectId>;

    /// Defining class loader, null for the boot loader.
    fn class_loader_of(&self, _class: ObjectId) -> ObjectId {
        ObjectId::NULL
    }

    /// Instance size in bytes.
    fn instance_size(&self, class: ObjectId) -> u32;

    /// Instance fields declared by `class` itself, in declared order.
    fn instance_fields(&self, class: ObjectId) -> Vec<FieldInfo>;

    /// Static fields declared by `class`.
    fn static_fields(&self, class: ObjectId) -> Vec<FieldInfo>;

    /// Reads the field at `offset` of `object` as `basic_type`.
    ///
    /// Static fields are read with the class object as `object`.
    fn read_field(&self, object: ObjectId, offset: u32, basic_type: BasicType) -> Option<FieldValue>;

    /// Elements of an object array.
    fn object_array_elements(&self, array: ObjectId) -> Option<Vec<ObjectId>>;

    /// Contents of a primitive array.
    fn primitive_array_elements(&self, array: ObjectId) -> Option<PrimitiveArray>;
}

/// Enumerates what a heap dump contains.
///
/// Each visitor returns a result; a walker stops at the first error and
/// returns it.
pub trait HeapWalker {
    /// Visits every loaded class object.
    fn visit_classes(&self, visitor: &mut dyn FnMut(ObjectId) -> DumpResult<()>) -> DumpResult<()>;

    /// Visits every GC root.
    fn visit_roots(&self, visitor: &mut dyn FnMut(&HeapRoot) -> DumpResult<()>) -> DumpResult<()>;

    /// Visits every live object, class objects included.
    fn visit_objects(&self, visitor: &mut dyn FnMut(ObjectId) -> DumpResult<()>) -> DumpResult<()>;
}
