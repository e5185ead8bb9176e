//! Dump configuration.

use crate::error::{Component, DumpError, DumpResult, Reason};
use hprof_sink::{DumpSink, FileSink};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the dump goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// File to create for the dump.
    pub output_path: Option<PathBuf>,

    /// Pre-opened descriptor of the output, used only in log messages.
    pub descriptor: Option<i32>,

    /// Stream to an attached debugger instead of a file.
    ///
    /// The transport must then be passed to
    /// [`crate::HeapDumpEngine::open_direct_to_debugger`].
    pub direct_to_debugger: bool,
}

impl SinkConfig {
    /// Configuration for a dump file at `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configuration for streaming to a debugger.
    #[must_use]
    pub fn debugger() -> Self {
        Self {
            direct_to_debugger: true,
            ..Self::default()
        }
    }

    /// Sets the informational descriptor.
    #[must_use]
    pub const fn descriptor(mut self, fd: i32) -> Self {
        self.descriptor = Some(fd);
        self
    }

    /// Opens a file sink for this configuration.
    ///
    /// # Errors
    ///
    /// - `ProtocolMisuse(MissingTransport)` if debugger output is selected
    /// - `ProtocolMisuse(MissingOutputPath)` if no path is configured
    /// - `IoFailure(SinkOpen)` if the file cannot be created
    pub fn open_file_sink<'a>(&self) -> DumpResult<Box<dyn DumpSink + 'a>> {
        if self.direct_to_debugger {
            return Err(DumpError::misuse(Component::Sink, Reason::MissingTransport));
        }
        let path = self
            .output_path
            .as_ref()
            .ok_or_else(|| DumpError::misuse(Component::Sink, Reason::MissingOutputPath))?;
        let sink = FileSink::create(path).map_err(|e| {
            DumpError::io(Component::Sink, Reason::SinkOpen, e)
                .with_tag(path.display().to_string())
        })?;
        Ok(Box::new(sink))
    }
}

/// When a heap dump segment is closed and a new one started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLimits {
    /// Body size at which the segment is closed before the next sub-record.
    pub max_segment_bytes: u32,

    /// Object count at which the segment is closed, if limited.
    pub max_objects_per_segment: Option<u32>,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            max_segment_bytes: 4096,
            max_objects_per_segment: Some(128),
        }
    }
}

impl SegmentLimits {
    /// Limits on body size only.
    #[must_use]
    pub const fn bytes(max_segment_bytes: u32) -> Self {
        Self {
            max_segment_bytes,
            max_objects_per_segment: None,
        }
    }
}

/// How instance fields are ordered in class and instance dumps.
///
/// The default follows the layout HPROF readers expect: each class dump
/// declares only its own fields and readers walk the superclass chain
/// themselves. [`FieldOrder::Flattened`] puts inherited fields first for
/// consumers that read each class dump on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldOrder {
    /// Class dumps list their own fields; instance data is the class's
    /// fields followed by each superclass's, nearest first.
    #[default]
    Hierarchical,
    /// Class dumps list every instance field, superclass fields first;
    /// instance data follows the same order.
    Flattened,
}

/// Configuration for one heap dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Output selection.
    pub sink: SinkConfig,

    /// Segment size limits.
    pub segments: SegmentLimits,

    /// Instance field ordering.
    pub field_order: FieldOrder,

    /// Emit primitive arrays without their contents.
    pub omit_primitive_array_data: bool,

    /// Write microseconds since dump start into record time fields.
    pub record_timestamps: bool,

    /// Fixed header timestamp in milliseconds; wall clock when `None`.
    pub header_timestamp_ms: Option<u64>,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            segments: SegmentLimits::default(),
            field_order: FieldOrder::default(),
            omit_primitive_array_data: false,
            record_timestamps: false,
            header_timestamp_ms: None,
        }
    }
}

impl DumpConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output.
    #[must_use]
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the segment limits.
    #[must_use]
    pub const fn segments(mut self, limits: SegmentLimits) -> Self {
        self.segments = limits;
        self
    }

    /// Sets the field ordering.
    #[must_use]
    pub const fn field_order(mut self, order: FieldOrder) -> Self {
        self.field_order = order;
        self
    }

    /// Sets whether primitive array contents are omitted.
    #[must_use]
    pub const fn omit_primitive_array_data(mut self, value: bool) -> Self {
        self.omit_primitive_array_data = value;
        self
    }

    /// Sets whether record time fields are filled.
    #[must_use]
    pub const fn record_timestamps(mut self, value: bool) -> Self {
        self.record_timestamps = value;
        self
    }

    /// Fixes the header timestamp.
    #[must_use]
    pub const fn header_timestamp_ms(mut self, ms: u64) -> Self {
        self.header_timestamp_ms = Some(ms);
        self
    }
}
