//! Benchmark support for the HPROF heap dump writer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
