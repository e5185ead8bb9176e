//! Top-level records and their serialization.
//!
//! ## Record Format
//!
//! ```text
//! | tag (1) | time (4) | length (4) | body (length) |
//! ```
//!
//! The length field is computed from the body at flush time and is never
//! stored separately.
//!
//! ## Invariants
//!
//! - A context holds exactly one current [`Record`]
//! - A dirty record is written exactly once, then cleared
//! - Appending to a clean record never emits bytes by itself

mod writer;

pub use writer::RecordWriter;

use hprof_codec::{RecordBuffer, RecordTag};

/// The record currently being filled.
#[derive(Debug, Clone)]
pub struct Record {
    tag: RecordTag,
    time: u32,
    body: RecordBuffer,
}

impl Record {
    /// Creates a clean record.
    pub fn new() -> Self {
        Self {
            tag: RecordTag::HeapDumpSegment,
            time: 0,
            body: RecordBuffer::new(),
        }
    }

    /// Discards any body and opens a new record.
    pub fn begin(&mut self, tag: RecordTag, time: u32) {
        self.body.clear();
        self.tag = tag;
        self.time = time;
        self.body.mark_dirty();
    }

    /// Returns `true` if the record holds unflushed content.
    pub fn is_dirty(&self) -> bool {
        self.body.is_dirty()
    }

    /// Returns `true` if the record is open with this tag and time.
    pub fn continues(&self, tag: RecordTag, time: u32) -> bool {
        self.is_dirty() && self.tag == tag && self.time == time
    }

    /// Record tag.
    pub fn tag(&self) -> RecordTag {
        self.tag
    }

    /// Record time.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Record body.
    pub fn body(&self) -> &RecordBuffer {
        &self.body
    }

    /// Mutable record body.
    pub fn body_mut(&mut self) -> &mut RecordBuffer {
        &mut self.body
    }

    /// Clears the body after a flush.
    pub fn clear(&mut self) {
        self.body.clear();
    }

    /// Frees the body allocation.
    pub fn release(&mut self) {
        self.body.release();
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}
