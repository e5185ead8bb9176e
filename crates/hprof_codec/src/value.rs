//! Typed field values and primitive array contents.

use crate::buffer::RecordBuffer;
use crate::error::CodecResult;
use crate::tags::BasicType;

/// A single field value read from the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Object reference (0 is null).
    Object(u32),
    /// `boolean`.
    Boolean(bool),
    /// `char`.
    Char(u16),
    /// `float`.
    Float(f32),
    /// `double`.
    Double(f64),
    /// `byte`.
    Byte(i8),
    /// `short`.
    Short(i16),
    /// `int`.
    Int(i32),
    /// `long`.
    Long(i64),
}

impl FieldValue {
    /// The basic type this value encodes as.
    #[must_use]
    pub const fn basic_type(&self) -> BasicType {
        match self {
            Self::Object(_) => BasicType::Object,
            Self::Boolean(_) => BasicType::Boolean,
            Self::Char(_) => BasicType::Char,
            Self::Float(_) => BasicType::Float,
            Self::Double(_) => BasicType::Double,
            Self::Byte(_) => BasicType::Byte,
            Self::Short(_) => BasicType::Short,
            Self::Int(_) => BasicType::Int,
            Self::Long(_) => BasicType::Long,
        }
    }

    /// Zero value of a basic type.
    #[must_use]
    pub const fn zero(ty: BasicType) -> Self {
        match ty {
            BasicType::Object => Self::Object(0),
            BasicType::Boolean => Self::Boolean(false),
            BasicType::Char => Self::Char(0),
            BasicType::Float => Self::Float(0.0),
            BasicType::Double => Self::Double(0.0),
            BasicType::Byte => Self::Byte(0),
            BasicType::Short => Self::Short(0),
            BasicType::Int => Self::Int(0),
            BasicType::Long => Self::Long(0),
        }
    }

    /// Appends the value using exactly `basic_type().size()` bytes.
    #[allow(clippy::cast_sign_loss)]
    pub fn encode(&self, buf: &mut RecordBuffer) -> CodecResult<()> {
        match *self {
            Self::Object(id) => buf.add_id(id),
            Self::Boolean(b) => buf.add_u1(u8::from(b)),
            Self::Char(c) => buf.add_u2(c),
            Self::Float(f) => buf.add_u4(f.to_bits()),
            Self::Double(d) => buf.add_u8(d.to_bits()),
            Self::Byte(b) => buf.add_u1(b as u8),
            Self::Short(s) => buf.add_u2(s as u16),
            Self::Int(i) => buf.add_u4(i as u32),
            Self::Long(l) => buf.add_u8(l as u64),
        }
    }

    /// Decodes a value of type `ty` from the front of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than the type's width.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(ty: BasicType, bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..ty.size())?;
        let value = match ty {
            BasicType::Object => Self::Object(u32::from_be_bytes(raw.try_into().ok()?)),
            BasicType::Boolean => Self::Boolean(raw[0] != 0),
            BasicType::Char => Self::Char(u16::from_be_bytes(raw.try_into().ok()?)),
            BasicType::Float => Self::Float(f32::from_bits(u32::from_be_bytes(raw.try_into().ok()?))),
            BasicType::Double => {
                Self::Double(f64::from_bits(u64::from_be_bytes(raw.try_into().ok()?)))
            }
            BasicType::Byte => Self::Byte(raw[0] as i8),
            BasicType::Short => Self::Short(i16::from_be_bytes(raw.try_into().ok()?)),
            BasicType::Int => Self::Int(i32::from_be_bytes(raw.try_into().ok()?)),
            BasicType::Long => Self::Long(i64::from_be_bytes(raw.try_into().ok()?)),
        };
        Some(value)
    }
}

/// Contents of a primitive array.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    /// `boolean[]`.
    Boolean(Vec<bool>),
    /// `char[]`.
    Char(Vec<u16>),
    /// `float[]`.
    Float(Vec<f32>),
    /// `double[]`.
    Double(Vec<f64>),
    /// `byte[]`.
    Byte(Vec<i8>),
    /// `short[]`.
    Short(Vec<i16>),
    /// `int[]`.
    Int(Vec<i32>),
    /// `long[]`.
    Long(Vec<i64>),
}

impl PrimitiveArray {
    /// Element type.
    #[must_use]
    pub const fn element_type(&self) -> BasicType {
        match self {
            Self::Boolean(_) => BasicType::Boolean,
            Self::Char(_) => BasicType::Char,
            Self::Float(_) => BasicType::Float,
            Self::Double(_) => BasicType::Double,
            Self::Byte(_) => BasicType::Byte,
            Self::Short(_) => BasicType::Short,
            Self::Int(_) => BasicType::Int,
            Self::Long(_) => BasicType::Long,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
        }
    }

    /// Returns `true` if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the raw big-endian element bytes.
    #[allow(clippy::cast_sign_loss)]
    pub fn encode_elements(&self, buf: &mut RecordBuffer) -> CodecResult<()> {
        match self {
            Self::Boolean(v) => {
                let bytes: Vec<u8> = v.iter().map(|&b| u8::from(b)).collect();
                buf.add_u1_list(&bytes)
            }
            Self::Byte(v) => {
                let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                buf.add_u1_list(&bytes)
            }
            Self::Char(v) => buf.add_u2_list(v),
            Self::Short(v) => {
                let words: Vec<u16> = v.iter().map(|&s| s as u16).collect();
                buf.add_u2_list(&words)
            }
            Self::Float(v) => {
                let words: Vec<u32> = v.iter().map(|f| f.to_bits()).collect();
                buf.add_u4_list(&words)
            }
            Self::Int(v) => {
                let words: Vec<u32> = v.iter().map(|&i| i as u32).collect();
                buf.add_u4_list(&words)
            }
            Self::Double(v) => {
                let words: Vec<u64> = v.iter().map(|d| d.to_bits()).collect();
                buf.add_u8_list(&words)
            }
            Self::Long(v) => {
                let words: Vec<u64> = v.iter().map(|&l| l as u64).collect();
                buf.add_u8_list(&words)
            }
        }
    }
}
