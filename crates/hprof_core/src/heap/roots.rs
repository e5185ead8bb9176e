//! GC root sub-records.

use crate::context::{DumpContext, GcScanState};
use crate::error::DumpResult;
use crate::types::ObjectId;
use hprof_codec::{RootKind, RootLayout, UNKNOWN_SERIAL};

/// One GC root reported by the heap walker.
///
/// Fields a root kind does not carry are ignored. Missing thread serials
/// fall back to the context's scan state; missing frame numbers and stack
/// trace serials are written as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRoot {
    /// Why the object is a root.
    pub kind: RootKind,
    /// Referenced object.
    pub object: ObjectId,
    /// Owning thread.
    pub thread_serial: Option<u32>,
    /// JNI global reference id.
    pub jni_handle: Option<u32>,
    /// Frame number within the owning thread's stack.
    pub frame_number: Option<u32>,
    /// Stack trace serial of a thread object.
    pub stack_trace_serial: Option<u32>,
}

impl HeapRoot {
    /// Creates a root with no optional data.
    #[must_use]
    pub const fn new(kind: RootKind, object: ObjectId) -> Self {
        Self {
            kind,
            object,
            thread_serial: None,
            jni_handle: None,
            frame_number: None,
            stack_trace_serial: None,
        }
    }

    /// JNI global reference root.
    #[must_use]
    pub const fn jni_global(object: ObjectId, handle: u32) -> Self {
        let mut root = Self::new(RootKind::JniGlobal, object);
        root.jni_handle = Some(handle);
        root
    }

    /// Sets the owning thread.
    #[must_use]
    pub const fn thread(mut self, serial: u32) -> Self {
        self.thread_serial = Some(serial);
        self
    }

    /// Sets the frame number.
    #[must_use]
    pub const fn frame(mut self, number: u32) -> Self {
        self.frame_number = Some(number);
        self
    }

    /// Sets the stack trace serial.
    #[must_use]
    pub const fn stack_trace(mut self, serial: u32) -> Self {
        self.stack_trace_serial = Some(serial);
        self
    }
}

impl<'a> DumpContext<'a> {
    /// Sets the kind and thread applied to subsequently scanned roots.
    ///
    /// Writes nothing.
    pub fn set_gc_scan_state(&mut self, kind: RootKind, thread_serial: u32) {
        self.scan_state = GcScanState {
            kind,
            thread_serial,
        };
    }

    /// Appends one root sub-record to the current segment.
    ///
    /// Null roots are skipped and `Ok(false)` is returned. Duplicate roots
    /// are written as given.
    pub fn mark_root(&mut self, root: &HeapRoot) -> DumpResult<bool> {
        if root.object.is_null() {
            return Ok(false);
        }
        let thread = root.thread_serial.unwrap_or(self.scan_state.thread_serial);
        self.begin_sub_record(None)?;

        let body = self.body_mut();
        body.add_u1(root.kind.as_byte())?;
        body.add_id(root.object.as_u32())?;
        match root.kind.layout() {
            RootLayout::IdOnly => {}
            RootLayout::JniGlobal => body.add_id(root.jni_handle.unwrap_or(0))?,
            RootLayout::ThreadFrame => {
                body.add_u4(thread)?;
                body.add_u4(root.frame_number.unwrap_or(UNKNOWN_SERIAL))?;
            }
            RootLayout::Thread => body.add_u4(thread)?,
            RootLayout::ThreadObject => {
                body.add_u4(thread)?;
                body.add_u4(root.stack_trace_serial.unwrap_or(UNKNOWN_SERIAL))?;
            }
        }
        self.counters.roots += 1;
        Ok(true)
    }

    /// Marks `object` as a root of the kind and thread set by
    /// [`DumpContext::set_gc_scan_state`].
    pub fn mark_scanned_root(&mut self, object: ObjectId) -> DumpResult<bool> {
        let state = self.scan_state;
        self.mark_root(&HeapRoot::new(state.kind, object).thread(state.thread_serial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DumpConfig;
    use crate::context::DumpPhase;
    use hprof_sink::InMemorySink;

    fn heap_context() -> DumpContext<'static> {
        let mut ctx =
            DumpContext::open(Box::new(InMemorySink::new()), &DumpConfig::default()).unwrap();
        ctx.start_heap_dump().unwrap();
        assert_eq!(ctx.phase(), DumpPhase::HeapDump);
        ctx
    }

    #[test]
    fn every_layout_has_its_length() {
        for kind in RootKind::ALL {
            let mut ctx = heap_context();
            let root = HeapRoot::new(kind, ObjectId(0x42)).thread(3);
            assert!(ctx.mark_root(&root).unwrap());
            assert_eq!(ctx.record.body().len(), 1 + kind.layout().body_len(), "{kind:?}");
            assert_eq!(ctx.record.body().as_bytes()[0], kind.as_byte());
        }
    }

    #[test]
    fn jni_global_carries_handle() {
        let mut ctx = heap_context();
        ctx.mark_root(&HeapRoot::jni_global(ObjectId(0x42), 0xBEEF)).unwrap();
        assert_eq!(
            ctx.record.body().as_bytes(),
            &[0x01, 0, 0, 0, 0x42, 0, 0, 0xBE, 0xEF]
        );
    }

    #[test]
    fn missing_frame_is_unknown() {
        let mut ctx = heap_context();
        ctx.mark_root(&HeapRoot::new(RootKind::JavaFrame, ObjectId(1)).thread(7))
            .unwrap();
        let body = ctx.record.body().as_bytes();
        assert_eq!(&body[5..9], &7u32.to_be_bytes());
        assert_eq!(&body[9..13], &[0xFF; 4]);
    }

    #[test]
    fn scan_state_supplies_kind_and_thread() {
        let mut ctx = heap_context();
        ctx.set_gc_scan_state(RootKind::NativeStack, 9);
        assert!(ctx.record.body().is_empty());
        ctx.mark_scanned_root(ObjectId(0x10)).unwrap();
        assert_eq!(
            ctx.record.body().as_bytes(),
            &[0x04, 0, 0, 0, 0x10, 0, 0, 0, 9]
        );
    }

    #[test]
    fn duplicates_kept_and_null_skipped() {
        let mut ctx = heap_context();
        let root = HeapRoot::new(RootKind::StickyClass, ObjectId(5));
        ctx.mark_root(&root).unwrap();
        ctx.mark_root(&root).unwrap();
        assert!(!ctx.mark_root(&HeapRoot::new(RootKind::Debugger, ObjectId::NULL)).unwrap());
        assert_eq!(ctx.record.body().len(), 10);
        assert_eq!(ctx.counters().roots, 2);
    }
}
