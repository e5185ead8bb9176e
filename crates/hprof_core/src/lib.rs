//! # HPROF Core
//!
//! Record-based writer for HPROF binary heap dumps.
//!
//! This crate provides:
//! - Per-dump context with record coalescing and size-bounded segments
//! - String and class interning tables
//! - GC root marking and class/instance/array encoding
//! - The [`HeapDumpEngine`] that orchestrates a dump, and [`dump_heap`]
//!   for a one-call dump driven by a [`HeapWalker`]
//!
//! ## Output Layout
//!
//! ```text
//! header | STRING* | LOAD_CLASS* | STACK_TRACE | HEAP_DUMP_SEGMENT+ | HEAP_DUMP_END
//! ```
//!
//! Definitions discovered during the heap walk are written as STRING and
//! LOAD_CLASS records just before the segment that first uses them.
//!
//! ## Collaborators
//!
//! The caller supplies an [`ObjectModel`] (class layouts and typed field
//! reads) and either drives the engine directly or supplies a
//! [`HeapWalker`]. Output goes to any [`hprof_sink::DumpSink`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod engine;
mod error;
mod heap;
mod model;
mod record;
mod table;
mod types;

pub use config::{DumpConfig, FieldOrder, SegmentLimits, SinkConfig};
pub use context::{DumpContext, DumpCounters, DumpPhase, GcScanState};
pub use engine::{dump_heap, dump_heap_to, dump_heap_to_debugger, DumpSummary, HeapDumpEngine};
pub use error::{Component, DumpError, DumpResult, ErrorSite, Reason};
pub use heap::{HeapRoot, ObjectEncoder};
pub use model::{FieldInfo, HeapWalker, ObjectKind, ObjectModel};
pub use record::{Record, RecordWriter};
pub use table::{ClassEntry, ClassTable, FieldDescriptor, StringTable, FIRST_STRING_ID};
pub use types::{ClassId, ObjectId, StringId};

pub use hprof_codec::{BasicType, FieldValue, HeapId, PrimitiveArray, RootKind};
