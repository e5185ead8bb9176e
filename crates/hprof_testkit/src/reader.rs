//! Conformant HPROF reader for verifying dumps.
//!
//! Parses the file header, top-level records and heap dump sub-records,
//! and checks that every string and class id is defined by an earlier
//! record before it is used.

use hprof_codec::{
    BasicType, FieldValue, HeapTag, RecordTag, RootKind, RootLayout, FILE_HEADER_SIZE,
    FORMAT_MAGIC,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised while reading a dump.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    /// The file does not start with the format magic.
    #[error("bad format magic")]
    BadMagic,

    /// Identifier size other than 4.
    #[error("unsupported identifier size {0}")]
    IdSize(u32),

    /// Input ends inside a structure.
    #[error("truncated input at offset {0}")]
    Truncated(usize),

    /// Unknown top-level record tag.
    #[error("unknown record tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// Tag byte.
        tag: u8,
        /// Offset of the record header.
        offset: usize,
    },

    /// Unknown heap sub-record tag.
    #[error("unknown heap sub-record tag {0:#04x}")]
    UnknownSubTag(u8),

    /// Unknown basic type byte.
    #[error("unknown basic type {0}")]
    UnknownType(u8),

    /// A string id was used before its STRING record.
    #[error("string id {0:#x} used before definition")]
    UndefinedString(u32),

    /// A class id was used before its LOAD_CLASS record.
    #[error("class id {0:#x} used before definition")]
    UndefinedClass(u32),

    /// An instance's data does not match its class layout.
    #[error("instance {0:#x} does not match its class layout")]
    LayoutMismatch(u32),
}

/// Result type for reads.
pub type ReadResult<T> = Result<T, ReadError>;

struct Cursor<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> Cursor<'b> {
    fn new(bytes: &'b [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> ReadResult<&'b [u8]> {
        let end = self.pos.checked_add(n).ok_or(ReadError::Truncated(self.pos))?;
        let out = self
            .bytes
            .get(self.pos..end)
            .ok_or(ReadError::Truncated(self.pos))?;
        self.pos = end;
        Ok(out)
    }

    fn u1(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> ReadResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> ReadResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn basic_type(&mut self) -> ReadResult<BasicType> {
        let b = self.u1()?;
        BasicType::from_byte(b).ok_or(ReadError::UnknownType(b))
    }

    fn value(&mut self, ty: BasicType) -> ReadResult<FieldValue> {
        let at = self.pos;
        let raw = self.take(ty.size())?;
        FieldValue::decode(ty, raw).ok_or(ReadError::Truncated(at))
    }
}

/// One top-level record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record tag.
    pub tag: RecordTag,
    /// Time field.
    pub time: u32,
    /// Body bytes; the length field equals `body.len()`.
    pub body: Vec<u8>,
}

/// A parsed dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HprofFile {
    /// Identifier size from the header.
    pub id_size: u32,
    /// Header timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Records in file order.
    pub records: Vec<RawRecord>,
}

impl HprofFile {
    /// Parses a complete dump.
    pub fn parse(bytes: &[u8]) -> ReadResult<Self> {
        if bytes.len() < FILE_HEADER_SIZE || &bytes[..FORMAT_MAGIC.len()] != FORMAT_MAGIC {
            return Err(ReadError::BadMagic);
        }
        let mut cur = Cursor::new(bytes);
        cur.take(FORMAT_MAGIC.len())?;
        let id_size = cur.u4()?;
        if id_size != 4 {
            return Err(ReadError::IdSize(id_size));
        }
        let high = u64::from(cur.u4()?);
        let low = u64::from(cur.u4()?);

        let mut records = Vec::new();
        while !cur.is_empty() {
            let offset = cur.pos;
            let tag_byte = cur.u1()?;
            let tag = RecordTag::from_byte(tag_byte).ok_or(ReadError::UnknownTag {
                tag: tag_byte,
                offset,
            })?;
            let time = cur.u4()?;
            let length = cur.u4()? as usize;
            let body = cur.take(length)?.to_vec();
            records.push(RawRecord { tag, time, body });
        }

        Ok(Self {
            id_size,
            timestamp_ms: (high << 32) | low,
            records,
        })
    }

    /// Tags of all records, in order.
    pub fn tags(&self) -> Vec<RecordTag> {
        self.records.iter().map(|r| r.tag).collect()
    }

    /// Bodies of all heap dump segments, in order.
    pub fn segment_bodies(&self) -> Vec<&[u8]> {
        self.records
            .iter()
            .filter(|r| r.tag.carries_heap_records())
            .map(|r| r.body.as_slice())
            .collect()
    }
}

/// LOAD_CLASS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadClass {
    /// Class serial.
    pub serial: u32,
    /// Class object id.
    pub class_id: u32,
    /// Stack trace serial.
    pub stack_trace_serial: u32,
    /// Name string id.
    pub name_id: u32,
}

/// Root sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRecord {
    /// Root kind.
    pub kind: RootKind,
    /// Referenced object.
    pub object: u32,
    /// Fields after the object id.
    pub extra: Vec<u32>,
}

/// CLASS_DUMP sub-record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDump {
    /// Class id.
    pub id: u32,
    /// Stack trace serial.
    pub stack_trace_serial: u32,
    /// Superclass id, 0 for none.
    pub super_id: u32,
    /// Class loader id.
    pub loader_id: u32,
    /// Instance size.
    pub instance_size: u32,
    /// Static fields as (name id, value).
    pub statics: Vec<(u32, FieldValue)>,
    /// Instance fields as (name id, type).
    pub fields: Vec<(u32, BasicType)>,
}

/// INSTANCE_DUMP sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDump {
    /// Object id.
    pub id: u32,
    /// Stack trace serial.
    pub stack_trace_serial: u32,
    /// Class id.
    pub class_id: u32,
    /// Raw field data.
    pub data: Vec<u8>,
}

/// OBJECT_ARRAY_DUMP sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectArrayDump {
    /// Object id.
    pub id: u32,
    /// Stack trace serial.
    pub stack_trace_serial: u32,
    /// Array class id.
    pub class_id: u32,
    /// Element ids.
    pub elements: Vec<u32>,
}

/// PRIMITIVE_ARRAY_DUMP or PRIMITIVE_ARRAY_NODATA_DUMP sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveArrayDump {
    /// Object id.
    pub id: u32,
    /// Stack trace serial.
    pub stack_trace_serial: u32,
    /// Element type.
    pub element_type: BasicType,
    /// Element count.
    pub length: u32,
    /// Raw element bytes; `None` for the no-data variant.
    pub data: Option<Vec<u8>>,
}

/// One heap dump sub-record.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRecord {
    /// GC root.
    Root(RootRecord),
    /// Heap switch.
    HeapInfo {
        /// Heap id.
        heap: u32,
        /// Heap name string id.
        name_id: u32,
    },
    /// Class definition.
    ClassDump(ClassDump),
    /// Instance.
    Instance(InstanceDump),
    /// Object array.
    ObjectArray(ObjectArrayDump),
    /// Primitive array.
    PrimitiveArray(PrimitiveArrayDump),
}

/// Parses the sub-records of one heap dump segment body.
pub fn parse_sub_records(body: &[u8]) -> ReadResult<Vec<SubRecord>> {
    let mut cur = Cursor::new(body);
    let mut out = Vec::new();
    while !cur.is_empty() {
        let tag = cur.u1()?;
        if let Some(kind) = RootKind::from_byte(tag) {
            let object = cur.u4()?;
            let extra_words = match kind.layout() {
                RootLayout::IdOnly => 0,
                RootLayout::JniGlobal | RootLayout::Thread => 1,
                RootLayout::ThreadFrame | RootLayout::ThreadObject => 2,
            };
            let extra = (0..extra_words)
                .map(|_| cur.u4())
                .collect::<ReadResult<Vec<_>>>()?;
            out.push(SubRecord::Root(RootRecord {
                kind,
                object,
                extra,
            }));
            continue;
        }

        let record = match HeapTag::from_byte(tag).ok_or(ReadError::UnknownSubTag(tag))? {
            HeapTag::HeapDumpInfo => SubRecord::HeapInfo {
                heap: cur.u4()?,
                name_id: cur.u4()?,
            },
            HeapTag::ClassDump => SubRecord::ClassDump(parse_class_dump(&mut cur)?),
            HeapTag::InstanceDump => {
                let id = cur.u4()?;
                let stack_trace_serial = cur.u4()?;
                let class_id = cur.u4()?;
                let len = cur.u4()? as usize;
                SubRecord::Instance(InstanceDump {
                    id,
                    stack_trace_serial,
                    class_id,
                    data: cur.take(len)?.to_vec(),
                })
            }
            HeapTag::ObjectArrayDump => {
                let id = cur.u4()?;
                let stack_trace_serial = cur.u4()?;
                let len = cur.u4()?;
                let class_id = cur.u4()?;
                let elements = (0..len)
                    .map(|_| cur.u4())
                    .collect::<ReadResult<Vec<_>>>()?;
                SubRecord::ObjectArray(ObjectArrayDump {
                    id,
                    stack_trace_serial,
                    class_id,
                    elements,
                })
            }
            tag @ (HeapTag::PrimitiveArrayDump | HeapTag::PrimitiveArrayNoDataDump) => {
                let id = cur.u4()?;
                let stack_trace_serial = cur.u4()?;
                let length = cur.u4()?;
                let element_type = cur.basic_type()?;
                let data = if tag == HeapTag::PrimitiveArrayDump {
                    Some(cur.take(length as usize * element_type.size())?.to_vec())
                } else {
                    None
                };
                SubRecord::PrimitiveArray(PrimitiveArrayDump {
                    id,
                    stack_trace_serial,
                    element_type,
                    length,
                    data,
                })
            }
        };
        out.push(record);
    }
    Ok(out)
}

fn parse_class_dump(cur: &mut Cursor<'_>) -> ReadResult<ClassDump> {
    let id = cur.u4()?;
    let stack_trace_serial = cur.u4()?;
    let super_id = cur.u4()?;
    let loader_id = cur.u4()?;
    for _ in 0..4 {
        cur.u4()?;
    }
    let instance_size = cur.u4()?;
    for _ in 0..cur.u2()? {
        cur.u2()?;
        let ty = cur.basic_type()?;
        cur.value(ty)?;
    }
    let mut statics = Vec::new();
    for _ in 0..cur.u2()? {
        let name = cur.u4()?;
        let ty = cur.basic_type()?;
        statics.push((name, cur.value(ty)?));
    }
    let mut fields = Vec::new();
    for _ in 0..cur.u2()? {
        let name = cur.u4()?;
        fields.push((name, cur.basic_type()?));
    }
    Ok(ClassDump {
        id,
        stack_trace_serial,
        super_id,
        loader_id,
        instance_size,
        statics,
        fields,
    })
}

/// A fully decoded dump.
#[derive(Debug, Clone)]
pub struct HeapDumpView {
    /// The raw file.
    pub file: HprofFile,
    /// Interned strings by id.
    pub strings: HashMap<u32, String>,
    /// LOAD_CLASS records in order.
    pub load_classes: Vec<LoadClass>,
    /// Sub-records of every segment, in order.
    pub sub_records: Vec<SubRecord>,
}

impl HeapDumpView {
    /// Parses and decodes `bytes`, checking definition order.
    pub fn read(bytes: &[u8]) -> ReadResult<Self> {
        let file = HprofFile::parse(bytes)?;
        let mut strings = HashMap::new();
        let mut load_classes = Vec::new();
        let mut sub_records = Vec::new();
        let mut classes = HashSet::new();

        let check_string = |strings: &HashMap<u32, String>, id: u32| {
            if strings.contains_key(&id) {
                Ok(())
            } else {
                Err(ReadError::UndefinedString(id))
            }
        };

        for record in &file.records {
            match record.tag {
                RecordTag::String => {
                    let mut cur = Cursor::new(&record.body);
                    let id = cur.u4()?;
                    let text = String::from_utf8_lossy(&record.body[4..]).into_owned();
                    strings.insert(id, text);
                }
                RecordTag::LoadClass => {
                    let mut cur = Cursor::new(&record.body);
                    let load = LoadClass {
                        serial: cur.u4()?,
                        class_id: cur.u4()?,
                        stack_trace_serial: cur.u4()?,
                        name_id: cur.u4()?,
                    };
                    check_string(&strings, load.name_id)?;
                    classes.insert(load.class_id);
                    load_classes.push(load);
                }
                RecordTag::HeapDump | RecordTag::HeapDumpSegment => {
                    for sub in parse_sub_records(&record.body)? {
                        match &sub {
                            SubRecord::HeapInfo { name_id, .. } => check_string(&strings, *name_id)?,
                            SubRecord::ClassDump(dump) => {
                                if !classes.contains(&dump.id) {
                                    return Err(ReadError::UndefinedClass(dump.id));
                                }
                                for (name, _) in &dump.statics {
                                    check_string(&strings, *name)?;
                                }
                                for (name, _) in &dump.fields {
                                    check_string(&strings, *name)?;
                                }
                            }
                            SubRecord::Instance(inst) if !classes.contains(&inst.class_id) => {
                                return Err(ReadError::UndefinedClass(inst.class_id));
                            }
                            SubRecord::ObjectArray(arr) if !classes.contains(&arr.class_id) => {
                                return Err(ReadError::UndefinedClass(arr.class_id));
                            }
                            _ => {}
                        }
                        sub_records.push(sub);
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            file,
            strings,
            load_classes,
            sub_records,
        })
    }

    /// Content of a string id.
    pub fn string(&self, id: u32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// Name of a loaded class.
    pub fn class_name(&self, class_id: u32) -> Option<&str> {
        self.load_classes
            .iter()
            .find(|c| c.class_id == class_id)
            .and_then(|c| self.string(c.name_id))
    }

    /// Whether the dump ends with HEAP_DUMP_END.
    pub fn is_complete(&self) -> bool {
        self.file.records.last().map(|r| r.tag) == Some(RecordTag::HeapDumpEnd)
    }

    /// All class dumps.
    pub fn class_dumps(&self) -> impl Iterator<Item = &ClassDump> {
        self.sub_records.iter().filter_map(|s| match s {
            SubRecord::ClassDump(c) => Some(c),
            _ => None,
        })
    }

    /// Class dump of `id`.
    pub fn class_dump(&self, id: u32) -> Option<&ClassDump> {
        self.class_dumps().find(|c| c.id == id)
    }

    /// All instances.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceDump> {
        self.sub_records.iter().filter_map(|s| match s {
            SubRecord::Instance(i) => Some(i),
            _ => None,
        })
    }

    /// Instance `id`.
    pub fn instance(&self, id: u32) -> Option<&InstanceDump> {
        self.instances().find(|i| i.id == id)
    }

    /// All roots.
    pub fn roots(&self) -> impl Iterator<Item = &RootRecord> {
        self.sub_records.iter().filter_map(|s| match s {
            SubRecord::Root(r) => Some(r),
            _ => None,
        })
    }

    /// All object arrays.
    pub fn object_arrays(&self) -> impl Iterator<Item = &ObjectArrayDump> {
        self.sub_records.iter().filter_map(|s| match s {
            SubRecord::ObjectArray(a) => Some(a),
            _ => None,
        })
    }

    /// All primitive arrays.
    pub fn primitive_arrays(&self) -> impl Iterator<Item = &PrimitiveArrayDump> {
        self.sub_records.iter().filter_map(|s| match s {
            SubRecord::PrimitiveArray(a) => Some(a),
            _ => None,
        })
    }

    /// Decodes an instance's field data against its class dumps.
    ///
    /// Fields are read the conformant way: the class's own fields, then
    /// each superclass's, nearest first. Returns `(field name, value)`.
    pub fn instance_values(&self, id: u32) -> ReadResult<Vec<(String, FieldValue)>> {
        let inst = self.instance(id).ok_or(ReadError::LayoutMismatch(id))?;
        let mut cur = Cursor::new(&inst.data);
        let mut values = Vec::new();
        let mut class_id = inst.class_id;
        while class_id != 0 {
            let dump = self
                .class_dump(class_id)
                .ok_or(ReadError::UndefinedClass(class_id))?;
            for &(name_id, ty) in &dump.fields {
                let name = self
                    .string(name_id)
                    .ok_or(ReadError::UndefinedString(name_id))?;
                let value = cur.value(ty).map_err(|_| ReadError::LayoutMismatch(id))?;
                values.push((name.to_string(), value));
            }
            class_id = dump.super_id;
        }
        if !cur.is_empty() {
            return Err(ReadError::LayoutMismatch(id));
        }
        Ok(values)
    }
}
