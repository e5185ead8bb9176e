//! Record tags, heap sub-record tags, and basic types.

/// Size in bytes of every identifier in the dump.
pub const ID_SIZE: u32 = 4;

/// Stack trace serial used when an object's allocation site is unknown.
pub const NULL_STACK_TRACE: u32 = 0;

/// Thread serial used when no thread is associated.
pub const NULL_THREAD: u32 = 0;

/// Frame number or stack trace serial written when the value is unknown.
pub const UNKNOWN_SERIAL: u32 = u32::MAX;

/// Tag of a top-level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordTag {
    /// UTF-8 string with its identifier.
    String = 0x01,
    /// A loaded class.
    LoadClass = 0x02,
    /// An unloaded class.
    UnloadClass = 0x03,
    /// One stack frame.
    StackFrame = 0x04,
    /// A stack trace made of frames.
    StackTrace = 0x05,
    /// Allocation sites.
    AllocSites = 0x06,
    /// Heap summary.
    HeapSummary = 0x07,
    /// Thread start.
    StartThread = 0x0A,
    /// Thread end.
    EndThread = 0x0B,
    /// Unsegmented heap dump.
    HeapDump = 0x0C,
    /// One segment of a heap dump.
    HeapDumpSegment = 0x1C,
    /// Marks the end of a segmented heap dump.
    HeapDumpEnd = 0x2C,
    /// CPU samples.
    CpuSamples = 0x0D,
    /// Control settings.
    ControlSettings = 0x0E,
}

impl RecordTag {
    /// Converts a byte to a record tag.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::String),
            0x02 => Some(Self::LoadClass),
            0x03 => Some(Self::UnloadClass),
            0x04 => Some(Self::StackFrame),
            0x05 => Some(Self::StackTrace),
            0x06 => Some(Self::AllocSites),
            0x07 => Some(Self::HeapSummary),
            0x0A => Some(Self::StartThread),
            0x0B => Some(Self::EndThread),
            0x0C => Some(Self::HeapDump),
            0x1C => Some(Self::HeapDumpSegment),
            0x2C => Some(Self::HeapDumpEnd),
            0x0D => Some(Self::CpuSamples),
            0x0E => Some(Self::ControlSettings),
            _ => None,
        }
    }

    /// Converts the tag to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns `true` for records whose body is a sequence of heap sub-records.
    #[must_use]
    pub const fn carries_heap_records(self) -> bool {
        matches!(self, Self::HeapDump | Self::HeapDumpSegment)
    }
}

/// Why an object is a GC root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RootKind {
    /// Root of unknown origin.
    Unknown = 0xFF,
    /// JNI global reference.
    JniGlobal = 0x01,
    /// JNI local reference.
    JniLocal = 0x02,
    /// Local variable in a managed frame.
    JavaFrame = 0x03,
    /// Reference from native stack.
    NativeStack = 0x04,
    /// System class that is never unloaded.
    StickyClass = 0x05,
    /// Reference from a thread block.
    ThreadBlock = 0x06,
    /// Object used as a monitor.
    MonitorUsed = 0x07,
    /// Thread object.
    ThreadObject = 0x08,
    // 0x8a (finalizing) and 0x8c (reference cleanup) are obsolete and
    // never emitted.
    /// Interned string.
    InternedString = 0x89,
    /// Object held by the debugger.
    Debugger = 0x8b,
    /// Object held by the runtime itself.
    VmInternal = 0x8d,
    /// Monitor held from native code.
    JniMonitor = 0x8e,
}

impl RootKind {
    /// Every root kind, in tag order.
    pub const ALL: [Self; 13] = [
        Self::JniGlobal,
        Self::JniLocal,
        Self::JavaFrame,
        Self::NativeStack,
        Self::StickyClass,
        Self::ThreadBlock,
        Self::MonitorUsed,
        Self::ThreadObject,
        Self::InternedString,
        Self::Debugger,
        Self::VmInternal,
        Self::JniMonitor,
        Self::Unknown,
    ];

    /// Converts a byte to a root kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_byte() == b)
    }

    /// Converts the root kind to its sub-record tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Shape of the sub-record body that follows the object id.
    #[must_use]
    pub const fn layout(self) -> RootLayout {
        match self {
            Self::Unknown
            | Self::StickyClass
            | Self::MonitorUsed
            | Self::InternedString
            | Self::Debugger
            | Self::VmInternal => RootLayout::IdOnly,
            Self::JniGlobal => RootLayout::JniGlobal,
            Self::JniLocal | Self::JavaFrame | Self::JniMonitor => RootLayout::ThreadFrame,
            Self::NativeStack | Self::ThreadBlock => RootLayout::Thread,
            Self::ThreadObject => RootLayout::ThreadObject,
        }
    }
}

/// Fields a root sub-record carries after the object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLayout {
    /// Nothing.
    IdOnly,
    /// JNI global reference id.
    JniGlobal,
    /// Thread serial and frame number.
    ThreadFrame,
    /// Thread serial.
    Thread,
    /// Thread serial and stack trace serial.
    ThreadObject,
}

impl RootLayout {
    /// Number of body bytes following the tag byte.
    #[must_use]
    pub const fn body_len(self) -> usize {
        let id = ID_SIZE as usize;
        match self {
            Self::IdOnly => id,
            Self::JniGlobal => id + id,
            Self::Thread => id + 4,
            Self::ThreadFrame | Self::ThreadObject => id + 8,
        }
    }
}

/// Tag of a non-root heap sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeapTag {
    /// Class definition.
    ClassDump = 0x20,
    /// Plain instance.
    InstanceDump = 0x21,
    /// Array of references.
    ObjectArrayDump = 0x22,
    /// Array of primitives.
    PrimitiveArrayDump = 0x23,
    /// Switches the heap that following objects belong to.
    HeapDumpInfo = 0xfe,
    /// Array of primitives with contents omitted.
    PrimitiveArrayNoDataDump = 0xc3,
}

impl HeapTag {
    /// Converts a byte to a heap tag.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x20 => Some(Self::ClassDump),
            0x21 => Some(Self::InstanceDump),
            0x22 => Some(Self::ObjectArrayDump),
            0x23 => Some(Self::PrimitiveArrayDump),
            0xfe => Some(Self::HeapDumpInfo),
            0xc3 => Some(Self::PrimitiveArrayNoDataDump),
            _ => None,
        }
    }

    /// Converts the tag to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Heap partition an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapId {
    /// Unpartitioned heap.
    #[default]
    Default,
    /// Objects allocated by the application.
    App,
    /// Objects inherited from the zygote process.
    Zygote,
}

impl HeapId {
    /// Value written in a heap info sub-record.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::App => b'A' as u32,
            Self::Zygote => b'Z' as u32,
        }
    }

    /// Converts a heap info value back to a heap id.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Default),
            0x41 => Some(Self::App),
            0x5A => Some(Self::Zygote),
            _ => None,
        }
    }

    /// Name interned for the heap info sub-record.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::App => "app",
            Self::Zygote => "zygote",
        }
    }
}

/// Type of a field or array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicType {
    /// Object reference.
    Object = 2,
    /// `boolean`.
    Boolean = 4,
    /// `char` (UTF-16 code unit).
    Char = 5,
    /// `float`.
    Float = 6,
    /// `double`.
    Double = 7,
    /// `byte`.
    Byte = 8,
    /// `short`.
    Short = 9,
    /// `int`.
    Int = 10,
    /// `long`.
    Long = 11,
}

impl BasicType {
    /// Converts a byte to a basic type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(Self::Object),
            4 => Some(Self::Boolean),
            5 => Some(Self::Char),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::Byte),
            9 => Some(Self::Short),
            10 => Some(Self::Int),
            11 => Some(Self::Long),
            _ => None,
        }
    }

    /// Converts the type to its tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Width in bytes of one value of this type.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Object => ID_SIZE as usize,
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Float | Self::Int => 4,
            Self::Double | Self::Long => 8,
        }
    }
}
