//! # HPROF Sink
//!
//! Output sinks for HPROF heap dumps.
//!
//! This crate provides the lowest-level output abstraction for the dump
//! writer. Sinks are **opaque byte streams** - they do not interpret the
//! records they carry.
//!
//! ## Design Principles
//!
//! - Sinks are append-only byte streams (write, flush, close)
//! - No knowledge of the HPROF record layout
//! - A sink is driven by exactly one dump at a time
//! - The dump writer owns all format interpretation
//!
//! ## Available Sinks
//!
//! - [`InMemorySink`] - For testing and in-process consumers
//! - [`FileSink`] - For dump files created through OS file APIs
//! - [`DebuggerSink`] - Streams to a borrowed [`DebuggerTransport`]
//!
//! ## Example
//!
//! ```rust
//! use hprof_sink::{DumpSink, InMemorySink};
//!
//! let mut sink = InMemorySink::new();
//! let reader = sink.clone();
//! sink.write_all(b"JAVA PROFILE").unwrap();
//! assert_eq!(reader.data(), b"JAVA PROFILE");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod debugger;
mod error;
mod file;
mod memory;
mod sink;

pub use debugger::{DebuggerSink, DebuggerTransport, DEFAULT_CHUNK_SIZE};
pub use error::{SinkError, SinkResult};
pub use file::FileSink;
pub use memory::InMemorySink;
pub use sink::DumpSink;
