//! # HPROF Testkit
//!
//! Test utilities for the HPROF heap dump writer.
//!
//! This crate provides:
//! - A conformant reader that parses dumps and checks definition order
//! - [`SyntheticHeap`], an in-memory object model and heap walker
//! - Sinks and transports with scripted failures
//! - Property-based heap generators using proptest
//! - Byte-exact dump vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hprof_testkit::prelude::*;
//!
//! #[test]
//! fn dumps_one_class() {
//!     let mut heap = SyntheticHeap::new();
//!     heap.add_class("java.lang.Object", None, &[]);
//!     let view = dump_and_read(&heap, &test_config());
//!     assert_eq!(view.load_classes.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod reader;
pub mod synthetic;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::reader::*;
    pub use crate::synthetic::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use reader::{HeapDumpView, HprofFile, ReadError, SubRecord};
pub use synthetic::SyntheticHeap;
pub use vectors::*;
