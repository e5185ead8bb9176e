//! Error types for heap dump operations.
//!
//! Every failure is one of three kinds:
//!
//! - [`DumpError::AllocationFailure`] - a buffer or table could not grow
//! - [`DumpError::IoFailure`] - the sink could not be opened or written
//! - [`DumpError::ProtocolMisuse`] - the caller broke the dump protocol
//!
//! Each carries an [`ErrorSite`] naming the component and reason, plus an
//! optional diagnostic tag. The first two kinds are fatal: the context that
//! produced them is poisoned and refuses further work until released.

use hprof_codec::CodecError;
use hprof_sink::SinkError;
use std::fmt;
use thiserror::Error;

/// Result type for dump operations.
pub type DumpResult<T> = Result<T, DumpError>;

/// Part of the writer an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Component {
    /// Record body buffer.
    RecordBuffer = 1,
    /// Record framing and sink writes.
    RecordWriter = 2,
    /// Per-dump context and segmentation.
    Context = 3,
    /// String interning table.
    StringTable = 4,
    /// Class interning table.
    ClassTable = 5,
    /// Class/instance/array encoder.
    ObjectEncoder = 6,
    /// Dump orchestration.
    Engine = 7,
    /// Output sink setup.
    Sink = 8,
}

impl Component {
    fn name(self) -> &'static str {
        match self {
            Self::RecordBuffer => "record_buffer",
            Self::RecordWriter => "record_writer",
            Self::Context => "context",
            Self::StringTable => "string_table",
            Self::ClassTable => "class_table",
            Self::ObjectEncoder => "object_encoder",
            Self::Engine => "engine",
            Self::Sink => "sink",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable cause of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Reason {
    /// A record body could not grow.
    BufferGrowth = 1,
    /// An interning table could not grow.
    TableInsert = 2,
    /// The output could not be opened.
    SinkOpen = 3,
    /// A write to the output failed.
    SinkWrite = 4,
    /// A flush or close of the output failed.
    SinkFlush = 5,
    /// A table was used before startup or after shutdown.
    TableUninitialized = 6,
    /// The object model does not know the object.
    UnknownObject = 7,
    /// An identifier was never registered in this dump.
    UnregisteredId = 8,
    /// An operation was invoked in the wrong dump phase.
    PhaseOrder = 9,
    /// An earlier fatal failure poisoned the context.
    ContextPoisoned = 10,
    /// The context was released.
    ContextReleased = 11,
    /// A typed read returned a value of the wrong basic type.
    FieldTypeMismatch = 12,
    /// A record or count does not fit its length field.
    RecordTooLarge = 13,
    /// Direct-to-debugger output was requested without a transport.
    MissingTransport = 14,
    /// File output was requested without a path.
    MissingOutputPath = 15,
}

impl Reason {
    fn name(self) -> &'static str {
        match self {
            Self::BufferGrowth => "buffer_growth",
            Self::TableInsert => "table_insert",
            Self::SinkOpen => "sink_open",
            Self::SinkWrite => "sink_write",
            Self::SinkFlush => "sink_flush",
            Self::TableUninitialized => "table_uninitialized",
            Self::UnknownObject => "unknown_object",
            Self::UnregisteredId => "unregistered_id",
            Self::PhaseOrder => "phase_order",
            Self::ContextPoisoned => "context_poisoned",
            Self::ContextReleased => "context_released",
            Self::FieldTypeMismatch => "field_type_mismatch",
            Self::RecordTooLarge => "record_too_large",
            Self::MissingTransport => "missing_transport",
            Self::MissingOutputPath => "missing_output_path",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where and why an error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSite {
    /// Component that detected the failure.
    pub component: Component,
    /// Stable cause.
    pub reason: Reason,
    /// Optional free-form detail, such as the offending identifier.
    pub tag: Option<String>,
}

impl ErrorSite {
    /// Creates a site without a tag.
    #[must_use]
    pub const fn new(component: Component, reason: Reason) -> Self {
        Self {
            component,
            reason,
            tag: None,
        }
    }

    /// Numeric diagnostic code: component in the high half, reason in the low half.
    #[must_use]
    pub const fn code(&self) -> u32 {
        ((self.component as u32) << 16) | self.reason as u32
    }
}

impl fmt::Display for ErrorSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.reason)?;
        if let Some(tag) = &self.tag {
            write!(f, " ({tag})")?;
        }
        Ok(())
    }
}

/// Errors that can occur while writing a heap dump.
#[derive(Debug, Error)]
pub enum DumpError {
    /// A buffer or table could not obtain memory.
    #[error("allocation failure at {site}")]
    AllocationFailure {
        /// Where the allocation failed.
        site: ErrorSite,
    },

    /// The sink could not be opened or written.
    #[error("I/O failure at {site}: {source}")]
    IoFailure {
        /// Where the I/O failed.
        site: ErrorSite,
        /// The sink error.
        #[source]
        source: SinkError,
    },

    /// The caller violated the dump protocol.
    #[error("protocol misuse at {site}")]
    ProtocolMisuse {
        /// Where the misuse was detected.
        site: ErrorSite,
    },
}

impl DumpError {
    /// Creates an allocation failure.
    pub fn allocation(component: Component, reason: Reason) -> Self {
        Self::AllocationFailure {
            site: ErrorSite::new(component, reason),
        }
    }

    /// Creates an I/O failure.
    pub fn io(component: Component, reason: Reason, source: SinkError) -> Self {
        Self::IoFailure {
            site: ErrorSite::new(component, reason),
            source,
        }
    }

    /// Creates a protocol misuse error.
    pub fn misuse(component: Component, reason: Reason) -> Self {
        Self::ProtocolMisuse {
            site: ErrorSite::new(component, reason),
        }
    }

    /// Attaches a diagnostic tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        match &mut self {
            Self::AllocationFailure { site }
            | Self::IoFailure { site, .. }
            | Self::ProtocolMisuse { site } => site.tag = Some(tag.into()),
        }
        self
    }

    /// The site of the error.
    #[must_use]
    pub fn site(&self) -> &ErrorSite {
        match self {
            Self::AllocationFailure { site }
            | Self::IoFailure { site, .. }
            | Self::ProtocolMisuse { site } => site,
        }
    }

    /// Returns `true` for failures that abort the dump.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllocationFailure { .. } | Self::IoFailure { .. })
    }

    /// Converts a codec error raised while filling a buffer owned by `component`.
    pub fn from_codec(component: Component, err: CodecError) -> Self {
        match err {
            CodecError::AllocationFailure { requested } => {
                Self::allocation(component, Reason::BufferGrowth)
                    .with_tag(format!("{requested} bytes"))
            }
            CodecError::LengthOverflow { len } => {
                Self::misuse(component, Reason::RecordTooLarge).with_tag(format!("{len} bytes"))
            }
        }
    }
}

impl From<CodecError> for DumpError {
    fn from(err: CodecError) -> Self {
        Self::from_codec(Component::RecordBuffer, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_code_is_stable() {
        let site = ErrorSite::new(Component::StringTable, Reason::TableUninitialized);
        assert_eq!(site.code(), (4 << 16) | 6);
    }

    #[test]
    fn display_includes_tag() {
        let err = DumpError::misuse(Component::ClassTable, Reason::UnregisteredId)
            .with_tag("class:0x10");
        assert_eq!(
            err.to_string(),
            "protocol misuse at class_table/unregistered_id (class:0x10)"
        );
    }

    #[test]
    fn fatal_kinds() {
        assert!(DumpError::allocation(Component::RecordBuffer, Reason::BufferGrowth).is_fatal());
        assert!(DumpError::io(
            Component::RecordWriter,
            Reason::SinkWrite,
            SinkError::Closed
        )
        .is_fatal());
        assert!(!DumpError::misuse(Component::Context, Reason::PhaseOrder).is_fatal());
    }

    #[test]
    fn codec_errors_map_to_taxonomy() {
        let err: DumpError = CodecError::AllocationFailure { requested: 64 }.into();
        assert!(matches!(err, DumpError::AllocationFailure { .. }));
        assert_eq!(err.site().reason, Reason::BufferGrowth);

        let err = DumpError::from_codec(
            Component::RecordWriter,
            CodecError::LengthOverflow { len: 1 << 33 },
        );
        assert_eq!(err.site().component, Component::RecordWriter);
        assert_eq!(err.site().reason, Reason::RecordTooLarge);
    }
}
