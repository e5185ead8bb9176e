//! Identifier types.

use std::fmt;

/// Identity of a heap object as reported by the heap walker.
///
/// Zero is the null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The null reference.
    pub const NULL: Self = Self(0);

    /// Creates a new object ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `true` for the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{:#x}", self.0)
    }
}

/// Identifier of an interned string.
///
/// String IDs are allocated sequentially per dump and never reused
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringId(pub u32);

impl StringId {
    /// Creates a new string ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "str:{:#x}", self.0)
    }
}

/// Identifier of a registered class.
///
/// A class is identified in the dump by its class object, so the value
/// equals that object's [`ObjectId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Creates a new class ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The class ID of a class object.
    #[must_use]
    pub const fn of(class_object: ObjectId) -> Self {
        Self(class_object.0)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The class object this ID stands for.
    #[must_use]
    pub const fn object(self) -> ObjectId {
        ObjectId(self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class:{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_object() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::new(0x10).is_null());
        assert_eq!(ObjectId::default(), ObjectId::NULL);
    }

    #[test]
    fn class_id_matches_class_object() {
        let class_object = ObjectId::new(0x7000_0010);
        let id = ClassId::of(class_object);
        assert_eq!(id.as_u32(), class_object.as_u32());
        assert_eq!(id.object(), class_object);
    }

    #[test]
    fn display_forms() {
        assert_eq!(format!("{}", ObjectId::new(255)), "obj:0xff");
        assert_eq!(format!("{}", StringId::new(0x40_0000)), "str:0x400000");
        assert_eq!(format!("{}", ClassId::new(16)), "class:0x10");
    }
}
