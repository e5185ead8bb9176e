//! Per-dump state and the flush/segmentation protocol.
//!
//! ## Phases
//!
//! ```text
//! Init -> StringDump -> ClassDump -> HeapDump (segments) -> HeapDumpEnd -> Finished
//! ```
//!
//! Phases only move forward. Draining strings or classes again is allowed
//! until the heap dump starts; heap sub-records are only accepted during
//! `HeapDump`.
//!
//! ## Records
//!
//! The context holds one current [`Record`]. Starting a record with the
//! same tag and time as the open one continues it, which is how many heap
//! sub-records share one `HEAP_DUMP_SEGMENT`. Starting any other record
//! flushes the open one first.
//!
//! STRING and LOAD_CLASS records are written directly from a scratch
//! buffer, one definition per record. Definitions interned while a heap
//! segment is open are written just before that segment is flushed, so a
//! reader always sees an id defined before it is used.
//!
//! ## Failure
//!
//! An I/O or allocation failure poisons the context. Every later call
//! through [`DumpContext::run`] fails with `ContextPoisoned` until the
//! context is released.

use crate::config::{DumpConfig, SegmentLimits};
use crate::error::{Component, DumpError, DumpResult, Reason};
use crate::record::{Record, RecordWriter};
use crate::table::{ClassTable, StringTable};
use hprof_codec::{
    FileHeader, HeapId, HeapTag, RecordBuffer, RecordTag, RootKind, NULL_STACK_TRACE, NULL_THREAD,
};
use hprof_sink::DumpSink;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Dump phase, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DumpPhase {
    /// Header written, nothing else.
    Init,
    /// String definitions written.
    StringDump,
    /// Class definitions written.
    ClassDump,
    /// Heap sub-records are being written.
    HeapDump,
    /// End marker written.
    HeapDumpEnd,
    /// Sink closed.
    Finished,
}

/// Root kind and thread applied to scanned roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcScanState {
    /// Kind given to roots marked with [`DumpContext::mark_scanned_root`].
    pub kind: RootKind,
    /// Thread serial used when a root names no thread.
    pub thread_serial: u32,
}

impl Default for GcScanState {
    fn default() -> Self {
        Self {
            kind: RootKind::Unknown,
            thread_serial: NULL_THREAD,
        }
    }
}

/// What the context has written so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpCounters {
    /// STRING records.
    pub strings: u64,
    /// LOAD_CLASS records.
    pub classes: u64,
    /// CLASS_DUMP sub-records.
    pub class_dumps: u64,
    /// Root sub-records.
    pub roots: u64,
    /// Object sub-records, class dumps included.
    pub objects: u64,
    /// Heap dump segments.
    pub segments: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Active,
    Poisoned,
    Released,
}

/// Mutable state of one heap dump.
#[derive(Debug)]
pub struct DumpContext<'a> {
    pub(crate) record: Record,
    writer: RecordWriter<'a>,
    scratch: RecordBuffer,
    pub(crate) strings: StringTable,
    pub(crate) classes: ClassTable,
    phase: DumpPhase,
    state: ContextState,
    pub(crate) scan_state: GcScanState,
    current_heap: HeapId,
    objects_in_segment: u32,
    segment_time: u32,
    limits: SegmentLimits,
    record_timestamps: bool,
    started: Instant,
    stack_trace_written: bool,
    pub(crate) counters: DumpCounters,
}

impl<'a> DumpContext<'a> {
    /// Starts both tables and writes the file header to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if the header cannot be written.
    pub fn open(sink: Box<dyn DumpSink + 'a>, config: &DumpConfig) -> DumpResult<Self> {
        let mut writer = RecordWriter::new(sink);
        let timestamp_ms = config.header_timestamp_ms.unwrap_or_else(wall_clock_ms);
        writer.write_file_header(&FileHeader::new(timestamp_ms))?;

        let mut strings = StringTable::new();
        let mut classes = ClassTable::new();
        strings.startup();
        classes.startup();

        Ok(Self {
            record: Record::new(),
            writer,
            scratch: RecordBuffer::new(),
            strings,
            classes,
            phase: DumpPhase::Init,
            state: ContextState::Active,
            scan_state: GcScanState::default(),
            current_heap: HeapId::Default,
            objects_in_segment: 0,
            segment_time: 0,
            limits: config.segments,
            record_timestamps: config.record_timestamps,
            started: Instant::now(),
            stack_trace_written: false,
            counters: DumpCounters::default(),
        })
    }

    /// Current phase.
    pub fn phase(&self) -> DumpPhase {
        self.phase
    }

    /// Returns `true` after an I/O or allocation failure.
    pub fn is_poisoned(&self) -> bool {
        self.state == ContextState::Poisoned
    }

    /// Returns `true` after [`DumpContext::release`].
    pub fn is_released(&self) -> bool {
        self.state == ContextState::Released
    }

    /// Counters of written records.
    pub fn counters(&self) -> DumpCounters {
        self.counters
    }

    /// The string table.
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// The class table.
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// The record writer.
    pub fn writer(&self) -> &RecordWriter<'a> {
        &self.writer
    }

    /// Scan state applied to scanned roots.
    pub fn gc_scan_state(&self) -> GcScanState {
        self.scan_state
    }

    fn check_usable(&self) -> DumpResult<()> {
        match self.state {
            ContextState::Active => Ok(()),
            ContextState::Poisoned => {
                warn!(sink = %self.writer.describe(), "call on poisoned dump context");
                Err(DumpError::misuse(Component::Context, Reason::ContextPoisoned))
            }
            ContextState::Released => {
                Err(DumpError::misuse(Component::Context, Reason::ContextReleased))
            }
        }
    }

    /// Runs `op` if the context is usable, poisoning it on a fatal error.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolMisuse(ContextPoisoned)` or
    /// `ProtocolMisuse(ContextReleased)` without running `op`, or the error
    /// `op` returned.
    pub fn run<T, F>(&mut self, op: F) -> DumpResult<T>
    where
        F: FnOnce(&mut Self) -> DumpResult<T>,
    {
        self.check_usable()?;
        let result = op(self);
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(error = %err, sink = %self.writer.describe(), "heap dump aborted");
                self.state = ContextState::Poisoned;
            }
        }
        result
    }

    fn phase_error(&self, op: &str) -> DumpError {
        DumpError::misuse(Component::Context, Reason::PhaseOrder)
            .with_tag(format!("{op} during {:?}", self.phase))
    }

    pub(crate) fn require_phase(&self, phase: DumpPhase, op: &str) -> DumpResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.phase_error(op))
        }
    }

    pub(crate) fn require_before(&self, phase: DumpPhase, op: &str) -> DumpResult<()> {
        if self.phase < phase {
            Ok(())
        } else {
            Err(self.phase_error(op))
        }
    }

    /// Value for record time fields.
    pub fn record_time(&self) -> u32 {
        if self.record_timestamps {
            u32::try_from(self.started.elapsed().as_micros()).unwrap_or(u32::MAX)
        } else {
            0
        }
    }

    /// Continues the open record if it has this tag and time; otherwise
    /// flushes it and begins a new one.
    pub fn start_new_record(&mut self, tag: RecordTag, time: u32) -> DumpResult<()> {
        if self.record.continues(tag, time) {
            return Ok(());
        }
        self.flush_current_record()?;
        self.record.begin(tag, time);
        Ok(())
    }

    /// Writes the open record, if any, and clears it.
    ///
    /// Before a heap record is written, every definition it may reference
    /// that has not been written yet is written.
    pub fn flush_current_record(&mut self) -> DumpResult<()> {
        if !self.record.is_dirty() {
            return Ok(());
        }
        let tag = self.record.tag();
        if tag.carries_heap_records() {
            self.write_pending_definitions()?;
        }
        self.writer
            .write_record(tag, self.record.time(), self.record.body())?;
        if tag.carries_heap_records() {
            self.counters.segments += 1;
            self.objects_in_segment = 0;
        }
        self.record.clear();
        Ok(())
    }

    pub(crate) fn body_mut(&mut self) -> &mut RecordBuffer {
        self.record.body_mut()
    }

    fn write_pending_strings(&mut self) -> DumpResult<usize> {
        let time = self.record_time();
        let Self {
            strings,
            writer,
            scratch,
            ..
        } = self;
        let written = strings.drain_pending(|id, content| {
            scratch.clear();
            scratch
                .add_id(id.as_u32())
                .and_then(|()| scratch.add_utf8(content))
                .map_err(|e| DumpError::from_codec(Component::Context, e))?;
            writer.write_record(RecordTag::String, time, scratch)
        })?;
        self.counters.strings += written as u64;
        Ok(written)
    }

    fn write_pending_classes(&mut self) -> DumpResult<usize> {
        let time = self.record_time();
        let Self {
            classes,
            writer,
            scratch,
            ..
        } = self;
        let written = classes.drain_pending(|entry| {
            scratch.clear();
            scratch.add_u4(entry.serial)?;
            scratch.add_id(entry.id.as_u32())?;
            scratch.add_u4(entry.stack_trace_serial)?;
            scratch.add_id(entry.name_id.as_u32())?;
            writer.write_record(RecordTag::LoadClass, time, scratch)
        })?;
        self.counters.classes += written as u64;
        Ok(written)
    }

    fn write_pending_definitions(&mut self) -> DumpResult<()> {
        let strings = self.write_pending_strings()?;
        let classes = self.write_pending_classes()?;
        if self.phase == DumpPhase::HeapDump && strings + classes > 0 {
            debug!(strings, classes, "late definitions written");
        }
        Ok(())
    }

    fn write_stack_trace_placeholder(&mut self) -> DumpResult<()> {
        if self.stack_trace_written {
            return Ok(());
        }
        let time = self.record_time();
        self.scratch.clear();
        self.scratch.add_u4(NULL_STACK_TRACE)?;
        self.scratch.add_u4(NULL_THREAD)?;
        self.scratch.add_u4(0)?;
        self.writer
            .write_record(RecordTag::StackTrace, time, &self.scratch)?;
        self.stack_trace_written = true;
        Ok(())
    }

    /// Writes a STRING record for every string not yet written.
    ///
    /// Returns the number of records written.
    pub fn dump_strings(&mut self) -> DumpResult<usize> {
        if self.phase > DumpPhase::StringDump {
            return Err(self.phase_error("dump_strings"));
        }
        self.flush_current_record()?;
        let written = self.write_pending_strings()?;
        self.phase = DumpPhase::StringDump;
        debug!(strings = written, "string section written");
        Ok(written)
    }

    /// Writes a LOAD_CLASS record for every class not yet written, preceded
    /// by any strings they introduced.
    ///
    /// Returns the number of LOAD_CLASS records written.
    pub fn dump_classes(&mut self) -> DumpResult<usize> {
        if self.phase > DumpPhase::ClassDump {
            return Err(self.phase_error("dump_classes"));
        }
        self.flush_current_record()?;
        self.write_pending_strings()?;
        let written = self.write_pending_classes()?;
        self.write_stack_trace_placeholder()?;
        self.phase = DumpPhase::ClassDump;
        debug!(classes = written, "class section written");
        Ok(written)
    }

    /// Drains both tables and enters the heap dump phase.
    pub fn start_heap_dump(&mut self) -> DumpResult<()> {
        if self.phase >= DumpPhase::HeapDump {
            return Err(self.phase_error("start_heap_dump"));
        }
        self.dump_classes()?;
        self.phase = DumpPhase::HeapDump;
        self.current_heap = HeapId::Default;
        self.objects_in_segment = 0;
        debug!(
            max_segment_bytes = self.limits.max_segment_bytes,
            max_objects = ?self.limits.max_objects_per_segment,
            "heap dump started"
        );
        Ok(())
    }

    fn segment_full(&self) -> bool {
        let bytes = self.record.body().len();
        bytes >= self.limits.max_segment_bytes as usize
            || self
                .limits
                .max_objects_per_segment
                .is_some_and(|max| self.objects_in_segment >= max)
    }

    /// Prepares the current segment for one more sub-record.
    ///
    /// Flushes the open segment first if it reached a limit, and emits a
    /// HEAP_DUMP_INFO sub-record when `heap` differs from the current heap.
    pub(crate) fn begin_sub_record(&mut self, heap: Option<HeapId>) -> DumpResult<()> {
        self.require_phase(DumpPhase::HeapDump, "heap sub-record")?;

        let open = self.record.continues(RecordTag::HeapDumpSegment, self.segment_time);
        if open && self.segment_full() {
            debug!(
                bytes = self.record.body().len(),
                objects = self.objects_in_segment,
                "heap dump segment full"
            );
            self.flush_current_record()?;
        }
        if !self.record.continues(RecordTag::HeapDumpSegment, self.segment_time) {
            self.segment_time = self.record_time();
            self.start_new_record(RecordTag::HeapDumpSegment, self.segment_time)?;
        }

        if let Some(heap) = heap.filter(|&h| h != self.current_heap) {
            let name_id = self.strings.lookup_or_insert(heap.name())?;
            let body = self.record.body_mut();
            body.add_u1(HeapTag::HeapDumpInfo.as_byte())?;
            body.add_u4(heap.as_u32())?;
            body.add_id(name_id.as_u32())?;
            self.current_heap = heap;
        }
        Ok(())
    }

    /// Counts one object sub-record toward the segment limit.
    pub(crate) fn end_object(&mut self) {
        self.objects_in_segment += 1;
        self.counters.objects += 1;
    }

    /// Flushes the last segment and writes HEAP_DUMP_END.
    pub fn end_heap_dump(&mut self) -> DumpResult<()> {
        self.require_phase(DumpPhase::HeapDump, "end_heap_dump")?;
        self.flush_current_record()?;
        self.write_pending_definitions()?;
        let time = self.record_time();
        self.start_new_record(RecordTag::HeapDumpEnd, time)?;
        self.flush_current_record()?;
        self.phase = DumpPhase::HeapDumpEnd;
        Ok(())
    }

    /// Flushes and closes the sink.
    pub fn close(&mut self) -> DumpResult<()> {
        self.require_phase(DumpPhase::HeapDumpEnd, "close")?;
        self.writer.flush()?;
        self.writer.close()?;
        self.phase = DumpPhase::Finished;
        Ok(())
    }

    /// Frees every owned buffer and table and drops the sink.
    ///
    /// A borrowed debugger transport is left open. Calling this twice does
    /// nothing.
    pub fn release(&mut self) {
        if self.state == ContextState::Released {
            return;
        }
        self.record.release();
        self.scratch.release();
        self.strings.shutdown();
        self.classes.shutdown();
        self.writer.release();
        self.state = ContextState::Released;
        debug!("dump context released");
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
