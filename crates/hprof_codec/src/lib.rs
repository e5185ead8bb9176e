//! # HPROF Codec
//!
//! Wire vocabulary and record buffers for the HPROF heap-dump format.
//!
//! This crate knows how bytes are laid out, not what a heap looks like:
//! - Record and heap sub-record tags, root kinds, and basic types
//! - The file header and record header framing
//! - [`RecordBuffer`], the growable big-endian body of one record
//! - [`FieldValue`] and [`PrimitiveArray`] with their fixed-width encodings
//!
//! ## Record Framing
//!
//! ```text
//! | tag (1) | time (4) | length (4) | body (length) |
//! ```
//!
//! All multi-byte values are big-endian and every identifier is 4 bytes.
//!
//! ## Usage
//!
//! ```
//! use hprof_codec::{RecordBuffer, FieldValue};
//!
//! let mut body = RecordBuffer::new();
//! body.add_id(0x400000).unwrap();
//! body.add_utf8("java.lang.Object").unwrap();
//! FieldValue::Int(7).encode(&mut body).unwrap();
//! assert_eq!(body.length_field().unwrap(), 4 + 16 + 4);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod error;
mod header;
mod tags;
mod value;

pub use buffer::{RecordBuffer, INITIAL_CAPACITY};
pub use error::{CodecError, CodecResult};
pub use header::{
    encode_record_header, FileHeader, FILE_HEADER_SIZE, FORMAT_MAGIC, RECORD_HEADER_SIZE,
};
pub use tags::{
    BasicType, HeapId, HeapTag, RecordTag, RootKind, RootLayout, ID_SIZE, NULL_STACK_TRACE,
    NULL_THREAD, UNKNOWN_SERIAL,
};
pub use value::{FieldValue, PrimitiveArray};
