//! Dump orchestration.

use crate::config::DumpConfig;
use crate::context::{DumpContext, DumpPhase};
use crate::error::DumpResult;
use crate::heap::{HeapRoot, ObjectEncoder};
use crate::model::{HeapWalker, ObjectModel};
use crate::types::{ClassId, ObjectId, StringId};
use hprof_codec::RootKind;
use hprof_sink::{DebuggerSink, DebuggerTransport, DumpSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Totals reported when a dump finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSummary {
    /// STRING records written.
    pub strings: u64,
    /// Classes loaded (LOAD_CLASS records).
    pub classes: u64,
    /// Root sub-records written.
    pub roots: u64,
    /// Object sub-records written, class dumps included.
    pub objects: u64,
    /// HEAP_DUMP_SEGMENT records written.
    pub segments: u64,
    /// Top-level records written.
    pub records: u64,
    /// Bytes written, file header included.
    pub bytes_written: u64,
}

/// Drives one heap dump.
///
/// Every operation goes through the context's poisoning gate: after an I/O
/// or allocation failure every call fails until [`HeapDumpEngine::release`].
/// Dropping the engine releases it.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = HeapDumpEngine::open_with_sink(&config, &model, Box::new(sink))?;
/// engine.register_class(class)?;
/// engine.start_heap_dump()?;
/// engine.mark_root(&HeapRoot::jni_global(object, 1))?;
/// engine.dump_object(class)?;
/// engine.dump_object(object)?;
/// let summary = engine.finish()?;
/// ```
pub struct HeapDumpEngine<'a, M: ObjectModel + ?Sized> {
    ctx: DumpContext<'a>,
    encoder: ObjectEncoder<'a, M>,
}

impl<'a, M: ObjectModel + ?Sized> HeapDumpEngine<'a, M> {
    /// Opens a dump to the file named by `config.sink`.
    ///
    /// # Errors
    ///
    /// - `ProtocolMisuse(MissingTransport)` if the config selects debugger output
    /// - `ProtocolMisuse(MissingOutputPath)` if no path is configured
    /// - `IoFailure` if the file cannot be created or the header written
    pub fn open(config: &DumpConfig, model: &'a M) -> DumpResult<Self> {
        let sink = config.sink.open_file_sink()?;
        Self::open_with_sink(config, model, sink)
    }

    /// Opens a dump to an already opened sink.
    pub fn open_with_sink(
        config: &DumpConfig,
        model: &'a M,
        sink: Box<dyn DumpSink + 'a>,
    ) -> DumpResult<Self> {
        let ctx = DumpContext::open(sink, config)?;
        info!(
            sink = %ctx.writer().describe(),
            descriptor = ?config.sink.descriptor,
            "heap dump opened"
        );
        Ok(Self {
            ctx,
            encoder: ObjectEncoder::new(model, config),
        })
    }

    /// Opens a dump streamed to a borrowed debugger transport.
    ///
    /// The transport is never closed by the engine.
    pub fn open_direct_to_debugger(
        config: &DumpConfig,
        model: &'a M,
        transport: &'a mut dyn DebuggerTransport,
    ) -> DumpResult<Self> {
        Self::open_with_sink(config, model, Box::new(DebuggerSink::new(transport)))
    }

    /// Current phase.
    pub fn phase(&self) -> DumpPhase {
        self.ctx.phase()
    }

    /// The dump context.
    pub fn context(&self) -> &DumpContext<'a> {
        &self.ctx
    }

    /// Interns a string.
    pub fn intern_string(&mut self, content: &str) -> DumpResult<StringId> {
        self.ctx.run(|ctx| {
            ctx.require_before(DumpPhase::HeapDumpEnd, "intern_string")?;
            ctx.strings.lookup_or_insert(content)
        })
    }

    /// Registers a class object and its superclasses.
    pub fn register_class(&mut self, class: ObjectId) -> DumpResult<ClassId> {
        let encoder = &self.encoder;
        self.ctx.run(|ctx| {
            ctx.require_before(DumpPhase::HeapDumpEnd, "register_class")?;
            encoder.register_class(ctx, class)
        })
    }

    /// Writes every pending string definition.
    pub fn dump_strings(&mut self) -> DumpResult<usize> {
        self.ctx.run(DumpContext::dump_strings)
    }

    /// Writes every pending class definition.
    pub fn dump_classes(&mut self) -> DumpResult<usize> {
        self.ctx.run(DumpContext::dump_classes)
    }

    /// Drains both tables and starts the heap dump section.
    pub fn start_heap_dump(&mut self) -> DumpResult<()> {
        self.ctx.run(DumpContext::start_heap_dump)
    }

    /// Sets the kind and thread of subsequently scanned roots.
    pub fn set_gc_scan_state(&mut self, kind: RootKind, thread_serial: u32) -> DumpResult<()> {
        self.ctx.run(|ctx| {
            ctx.set_gc_scan_state(kind, thread_serial);
            Ok(())
        })
    }

    /// Writes one root sub-record.
    pub fn mark_root(&mut self, root: &HeapRoot) -> DumpResult<()> {
        self.ctx.run(|ctx| ctx.mark_root(root).map(|_| ()))
    }

    /// Writes a root of the current scan state's kind and thread.
    pub fn mark_scanned_root(&mut self, object: ObjectId) -> DumpResult<()> {
        self.ctx.run(|ctx| ctx.mark_scanned_root(object).map(|_| ()))
    }

    /// Writes the sub-record for one object.
    pub fn dump_object(&mut self, object: ObjectId) -> DumpResult<()> {
        let encoder = &self.encoder;
        self.ctx
            .run(|ctx| encoder.encode(ctx, object).map(|_| ()))
    }

    /// Dumps unvisited classes, writes the end marker and closes the sink.
    ///
    /// Starts the heap dump first if it was never started.
    pub fn finish(&mut self) -> DumpResult<DumpSummary> {
        let encoder = &self.encoder;
        self.ctx.run(|ctx| {
            if ctx.phase() < DumpPhase::HeapDump {
                ctx.start_heap_dump()?;
            }
            let swept = encoder.dump_remaining_classes(ctx)?;
            if swept > 0 {
                debug!(classes = swept, "dumped classes not visited by the walker");
            }
            ctx.end_heap_dump()?;
            ctx.close()
        })?;

        let counters = self.ctx.counters();
        let summary = DumpSummary {
            strings: counters.strings,
            classes: counters.classes,
            roots: counters.roots,
            objects: counters.objects,
            segments: counters.segments,
            records: self.ctx.writer().records_written(),
            bytes_written: self.ctx.writer().bytes_written(),
        };
        info!(
            sink = %self.ctx.writer().describe(),
            strings = summary.strings,
            classes = summary.classes,
            roots = summary.roots,
            objects = summary.objects,
            segments = summary.segments,
            bytes = summary.bytes_written,
            "heap dump finished"
        );
        Ok(summary)
    }

    /// Releases buffers, tables and the sink. Idempotent.
    pub fn release(&mut self) {
        self.ctx.release();
    }
}

impl<M: ObjectModel + ?Sized> Drop for HeapDumpEngine<'_, M> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<M: ObjectModel + ?Sized> std::fmt::Debug for HeapDumpEngine<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapDumpEngine")
            .field("phase", &self.ctx.phase())
            .field("sink", &self.ctx.writer().describe())
            .finish_non_exhaustive()
    }
}

fn drive<M, W>(engine: &mut HeapDumpEngine<'_, M>, walker: &W) -> DumpResult<DumpSummary>
where
    M: ObjectModel + ?Sized,
    W: HeapWalker + ?Sized,
{
    walker.visit_classes(&mut |class| engine.register_class(class).map(|_| ()))?;
    engine.dump_strings()?;
    engine.dump_classes()?;
    engine.start_heap_dump()?;
    walker.visit_roots(&mut |root| engine.mark_root(root))?;
    walker.visit_objects(&mut |object| engine.dump_object(object))?;
    engine.finish()
}

fn run_dump<'a, M, W>(mut engine: HeapDumpEngine<'a, M>, walker: &W) -> DumpResult<DumpSummary>
where
    M: ObjectModel + ?Sized,
    W: HeapWalker + ?Sized,
{
    let result = drive(&mut engine, walker);
    engine.release();
    result
}

/// Writes a complete dump of `walker`'s heap to the file named by `config`.
///
/// Classes are pre-scanned and both tables drained before the heap walk;
/// roots are written before objects. On failure the engine is released
/// and a partially written file is left in place.
pub fn dump_heap<M, W>(config: &DumpConfig, walker: &W, model: &M) -> DumpResult<DumpSummary>
where
    M: ObjectModel + ?Sized,
    W: HeapWalker + ?Sized,
{
    run_dump(HeapDumpEngine::open(config, model)?, walker)
}

/// Like [`dump_heap`], writing to `sink`.
pub fn dump_heap_to<'a, M, W>(
    config: &DumpConfig,
    walker: &W,
    model: &'a M,
    sink: Box<dyn DumpSink + 'a>,
) -> DumpResult<DumpSummary>
where
    M: ObjectModel + ?Sized,
    W: HeapWalker + ?Sized,
{
    run_dump(HeapDumpEngine::open_with_sink(config, model, sink)?, walker)
}

/// Like [`dump_heap`], streaming to a borrowed debugger transport.
pub fn dump_heap_to_debugger<'a, M, W>(
    config: &DumpConfig,
    walker: &W,
    model: &'a M,
    transport: &'a mut dyn DebuggerTransport,
) -> DumpResult<DumpSummary>
where
    M: ObjectModel + ?Sized,
    W: HeapWalker + ?Sized,
{
    run_dump(
        HeapDumpEngine::open_direct_to_debugger(config, model, transport)?,
        walker,
    )
}
